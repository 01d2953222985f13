//! ICS feed parsing using the icalendar crate's parser.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use icalendar::{
    DatePerhapsTime,
    parser::{Calendar, Component, Property, read_calendar, unfold},
};

use super::recurrence::{RecurringDefinition, expand};
use super::{IcsTime, ParsedFeed};
use crate::date_range::DateRange;
use crate::error::ParseError;
use crate::event::Event;
use crate::source::CalendarSource;

const UNTITLED: &str = "Untitled Event";

/// A VEVENT with the fields we need, before recurrence expansion.
struct RawEvent {
    uid: String,
    title: String,
    start: IcsTime,
    end: DateTime<Utc>,
    rrule: Option<String>,
    exdates: Vec<IcsTime>,
    recurrence_id: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl RawEvent {
    fn duration(&self) -> Duration {
        (self.end - self.start.to_utc()).max(Duration::zero())
    }
}

/// Parse raw feed bytes into events for `source`.
///
/// Recurring definitions are expanded within `horizon`. VEVENTs that cannot be
/// read are skipped and counted; only a feed that is not calendar data at all
/// fails the whole parse.
pub fn parse_feed(
    bytes: &[u8],
    source: &CalendarSource,
    horizon: &DateRange,
) -> Result<ParsedFeed, ParseError> {
    let content = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
    let content = content.trim_start_matches('\u{feff}');

    if !content.contains("BEGIN:VCALENDAR") {
        return Err(ParseError::Malformed("missing BEGIN:VCALENDAR".to_string()));
    }

    let unfolded = unfold(content);

    let collected = match read_calendar(&unfolded) {
        Ok(calendar) => {
            let mut collected = Collected {
                calendar_name: calendar_name(&calendar),
                ..Collected::default()
            };
            collected.read_vevents(&calendar, source);
            collected
        }
        Err(error) => {
            log::warn!(
                "'{}' has malformed content, reading its events one by one",
                source.name
            );
            read_blocks(&unfolded, source, error)?
        }
    };

    let (events, expansion_failures) = build_events(collected.raw_events, source, horizon);

    Ok(ParsedFeed {
        events,
        skipped: collected.skipped + expansion_failures,
        calendar_name: collected.calendar_name,
    })
}

/// VEVENTs read from a feed, before expansion.
#[derive(Default)]
struct Collected {
    calendar_name: Option<String>,
    raw_events: Vec<RawEvent>,
    skipped: usize,
}

impl Collected {
    fn read_vevents(&mut self, calendar: &Calendar, source: &CalendarSource) {
        for vevent in vevents(calendar) {
            match read_vevent(vevent) {
                Some(raw) => self.raw_events.push(raw),
                None => {
                    log::debug!(
                        "Skipping malformed VEVENT in '{}' (uid: {:?})",
                        source.name,
                        vevent.find_prop("UID").map(|p| p.val.to_string())
                    );
                    self.skipped += 1;
                }
            }
        }
    }
}

/// Read a feed the parser rejected as a whole, one VEVENT block at a time.
///
/// A block that does not parse on its own is skipped. The remaining lines must
/// still form a calendar, otherwise `error` is returned.
fn read_blocks(
    unfolded: &str,
    source: &CalendarSource,
    error: String,
) -> Result<Collected, ParseError> {
    let (skeleton, blocks, unterminated) = split_vevent_blocks(unfolded);

    let calendar = read_calendar(&skeleton).map_err(|_| ParseError::Malformed(error))?;
    let mut collected = Collected {
        calendar_name: calendar_name(&calendar),
        skipped: unterminated,
        ..Collected::default()
    };

    for block in &blocks {
        match read_calendar(block) {
            Ok(calendar) => collected.read_vevents(&calendar, source),
            Err(e) => {
                log::debug!("Skipping unreadable VEVENT in '{}': {}", source.name, e);
                collected.skipped += 1;
            }
        }
    }

    Ok(collected)
}

/// Split unfolded calendar text into the lines outside any VEVENT and the
/// VEVENT blocks themselves. Also returns the number of blocks missing their
/// `END:VEVENT`, which are dropped.
fn split_vevent_blocks(unfolded: &str) -> (String, Vec<String>, usize) {
    let mut skeleton = String::new();
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    let mut unterminated = 0;

    for line in unfolded.lines() {
        let marker = line.trim();

        if marker.eq_ignore_ascii_case("BEGIN:VEVENT") {
            if current.is_some() {
                unterminated += 1;
            }
            current = Some(String::new());
        }

        match current.as_mut() {
            Some(block) => {
                block.push_str(line);
                block.push_str("\r\n");
            }
            None => {
                skeleton.push_str(line);
                skeleton.push_str("\r\n");
            }
        }

        if marker.eq_ignore_ascii_case("END:VEVENT")
            && let Some(block) = current.take()
        {
            blocks.push(block);
        }
    }

    if current.is_some() {
        unterminated += 1;
    }

    (skeleton, blocks, unterminated)
}

fn calendar_name(calendar: &Calendar) -> Option<String> {
    // Depending on the parser version the VCALENDAR wrapper is either
    // flattened away or kept as a component.
    calendar
        .properties
        .iter()
        .chain(
            calendar
                .components
                .iter()
                .filter(|c| c.name == "VCALENDAR")
                .flat_map(|c| c.properties.iter()),
        )
        .find(|p| p.name == "X-WR-CALNAME")
        .map(|p| p.val.to_string().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn vevents<'c, 'a>(calendar: &'c Calendar<'a>) -> Vec<&'c Component<'a>> {
    let mut found = Vec::new();
    for component in &calendar.components {
        if component.name == "VEVENT" {
            found.push(component);
        } else if component.name == "VCALENDAR" {
            found.extend(component.components.iter().filter(|c| c.name == "VEVENT"));
        }
    }
    found
}

/// Turn raw VEVENTs into events: expand series, apply overrides, drop
/// cancellations. Returns the events and the number of series that failed.
fn build_events(
    raw_events: Vec<RawEvent>,
    source: &CalendarSource,
    horizon: &DateRange,
) -> (Vec<Event>, usize) {
    let make_event = |uid: String, title: &str, start: DateTime<Utc>, end: DateTime<Utc>| Event {
        uid,
        calendar_id: source.id(),
        start,
        end: end.max(start),
        title: title.to_string(),
        category: Some(source.category().to_string()),
    };

    // RECURRENCE-ID instances, keyed by series uid and original start
    let mut overrides: HashMap<(String, DateTime<Utc>), &RawEvent> = HashMap::new();
    for raw in &raw_events {
        if let Some(recurrence_id) = raw.recurrence_id {
            overrides.insert((raw.uid.clone(), recurrence_id), raw);
        }
    }

    let mut events = Vec::new();
    let mut failures = 0;

    for raw in &raw_events {
        if raw.recurrence_id.is_some() {
            continue;
        }

        let Some(rrule) = raw.rrule.as_deref() else {
            if !raw.cancelled {
                events.push(make_event(raw.uid.clone(), &raw.title, raw.start.to_utc(), raw.end));
            }
            continue;
        };

        if raw.cancelled {
            continue;
        }

        let definition = RecurringDefinition {
            uid: &raw.uid,
            start: &raw.start,
            duration: raw.duration(),
            rrule,
            exdates: &raw.exdates,
        };

        let occurrences = match expand(&definition, horizon) {
            Ok(occurrences) => occurrences,
            Err(e) => {
                log::warn!("Skipping recurring event in '{}': {}", source.name, e);
                failures += 1;
                continue;
            }
        };

        for occurrence in occurrences {
            let key = (raw.uid.clone(), occurrence.start);
            let uid = occurrence_uid(&raw.uid, occurrence.start);

            match overrides.remove(&key) {
                Some(instance) if instance.cancelled => {}
                Some(instance) => {
                    events.push(make_event(uid, &instance.title, instance.start.to_utc(), instance.end));
                }
                None => {
                    events.push(make_event(uid, &raw.title, occurrence.start, occurrence.end));
                }
            }
        }
    }

    // Overrides that did not match a generated occurrence (moved out of the
    // horizon, or whose series is missing) still describe real events.
    let mut leftovers: Vec<_> = overrides
        .into_iter()
        .filter(|(_, instance)| !instance.cancelled)
        .collect();
    leftovers.sort_by_key(|((uid, recurrence_id), _)| (uid.clone(), *recurrence_id));

    for ((uid, recurrence_id), instance) in leftovers {
        events.push(make_event(
            occurrence_uid(&uid, recurrence_id),
            &instance.title,
            instance.start.to_utc(),
            instance.end,
        ));
    }

    (events, failures)
}

/// Uid of one occurrence of a recurring series.
///
/// All occurrences share the series UID in the feed, so the original start is
/// appended to keep them apart.
fn occurrence_uid(series_uid: &str, original_start: DateTime<Utc>) -> String {
    format!("{}/{}", series_uid, original_start.format("%Y%m%dT%H%M%SZ"))
}

/// Read the fields of one VEVENT. None if it lacks a UID or a usable start.
fn read_vevent(vevent: &Component) -> Option<RawEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string().trim().to_string();
    if uid.is_empty() {
        return None;
    }

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let start = to_ics_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let start_utc = start.to_utc();

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_ics_time(DatePerhapsTime::try_from(prop).ok()?).to_utc(),
        None => match vevent.find_prop("DURATION") {
            Some(prop) => start_utc.checked_add_signed(parse_duration(prop.val.as_ref())?)?,
            // RFC 5545: a date-only start without end lasts one day
            None if start.is_date() => start_utc.checked_add_signed(Duration::days(1))?,
            None => start_utc,
        },
    };

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates: Vec<IcsTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_ics_time(dpt).to_utc());

    let cancelled = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"));

    Some(RawEvent {
        uid,
        title,
        start,
        end,
        rrule,
        exdates,
        recurrence_id,
        cancelled,
    })
}

/// Convert icalendar's DatePerhapsTime to our IcsTime, preserving timezone info
fn to_ics_time(dpt: DatePerhapsTime) -> IcsTime {
    match dpt {
        DatePerhapsTime::Date(d) => IcsTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => IcsTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => IcsTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                IcsTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Parse an ISO 8601 DURATION value such as `PT1H30M` or `P2D`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return Some(Duration::zero());
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Parse an EXDATE property into a list of IcsTime values.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
fn parse_exdate_property(prop: &Property) -> Vec<IcsTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(IcsTime::Date)
            } else if let Some(ref tz) = tzid {
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(s) = s.strip_suffix('Z') {
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::DateTimeUtc(dt.and_utc()))
            } else {
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(IcsTime::DateTimeFloating)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> CalendarSource {
        let mut source = CalendarSource::new("https://example.com/work.ics", "Work");
        source.category = Some("Job".to_string());
        source
    }

    fn horizon() -> DateRange {
        DateRange::from_args(Some("2024-01-01"), Some("2024-12-31")).unwrap()
    }

    fn wrap(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nX-WR-CALNAME:Team Work\r\n{}END:VCALENDAR\r\n",
            body
        )
    }

    #[test]
    fn test_parse_simple_events() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:a@test\r\n\
SUMMARY:Planning\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T113000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:b@test\r\n\
DTSTART;VALUE=DATE:20240105\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 0);
        assert_eq!(feed.calendar_name.as_deref(), Some("Team Work"));
        assert_eq!(feed.events.len(), 2);

        let planning = &feed.events[0];
        assert_eq!(planning.uid, "a@test");
        assert_eq!(planning.title, "Planning");
        assert_eq!(planning.duration_hours(), 1.5);
        assert_eq!(planning.category.as_deref(), Some("Job"));
        assert_eq!(planning.calendar_id, source().id());

        let all_day = &feed.events[1];
        assert_eq!(all_day.title, UNTITLED);
        assert_eq!(all_day.start, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(all_day.duration(), Duration::days(1));
    }

    #[test]
    fn test_zoned_times_are_converted_to_utc() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:z@test\r\n\
SUMMARY:Lunch\r\n\
DTSTART;TZID=Europe/Zurich:20240710T120000\r\n\
DURATION:PT45M\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        let lunch = &feed.events[0];
        assert_eq!(lunch.start, Utc.with_ymd_and_hms(2024, 7, 10, 10, 0, 0).unwrap());
        assert_eq!(lunch.duration(), Duration::minutes(45));
    }

    #[test]
    fn test_malformed_events_are_skipped_and_counted() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
SUMMARY:No uid\r\n\
DTSTART:20240101T100000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:no-start@test\r\n\
SUMMARY:No start\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ok@test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 2);
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "ok@test");
    }

    #[test]
    fn test_overflowing_duration_is_skipped() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:forever@test\r\n\
DTSTART:20240101T100000Z\r\n\
DURATION:P99999999D\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:forever-series@test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240102T100000Z\r\n\
RRULE:FREQ=DAILY;COUNT=2\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ok@test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 1);
        let uids: Vec<_> = feed.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(
            uids,
            vec![
                "forever-series@test/20240101T100000Z",
                "forever-series@test/20240102T100000Z",
                "ok@test",
            ]
        );
    }

    #[test]
    fn test_unparsable_line_only_skips_its_event() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:broken@test\r\n\
THIS LINE HAS NO COLON\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ok@test\r\n\
SUMMARY:Review\r\n\
DTSTART:20240102T100000Z\r\n\
DTEND:20240102T110000Z\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT15M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 1);
        assert_eq!(feed.calendar_name.as_deref(), Some("Team Work"));
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "ok@test");
        assert_eq!(feed.events[0].title, "Review");
    }

    #[test]
    fn test_unterminated_event_is_skipped() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:open@test\r\n\
DTSTART:20240101T100000Z\r\n\
BEGIN:VEVENT\r\n\
UID:ok@test\r\n\
DTSTART:20240102T100000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 1);
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "ok@test");
    }

    #[test]
    fn test_broken_calendar_properties_fail_the_feed() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nGARBAGE\r\nEND:VCALENDAR\r\n";
        assert!(matches!(
            parse_feed(ics.as_bytes(), &source(), &horizon()),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_cancelled_events_are_dropped() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:gone@test\r\n\
STATUS:CANCELLED\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert!(feed.events.is_empty());
        assert_eq!(feed.skipped, 0);
    }

    #[test]
    fn test_recurring_series_with_override_and_exdate() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:standup@test\r\n\
SUMMARY:Standup\r\n\
DTSTART:20240101T090000Z\r\n\
DTEND:20240101T091500Z\r\n\
RRULE:FREQ=WEEKLY;COUNT=4\r\n\
EXDATE:20240115T090000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:standup@test\r\n\
RECURRENCE-ID:20240108T090000Z\r\n\
SUMMARY:Long standup\r\n\
DTSTART:20240108T090000Z\r\n\
DTEND:20240108T100000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        let uids: Vec<_> = feed.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(
            uids,
            vec![
                "standup@test/20240101T090000Z",
                "standup@test/20240108T090000Z",
                "standup@test/20240122T090000Z",
            ]
        );
        assert_eq!(feed.events[1].title, "Long standup");
        assert_eq!(feed.events[1].duration(), Duration::hours(1));
        assert_eq!(feed.events[2].duration(), Duration::minutes(15));
    }

    #[test]
    fn test_broken_rrule_only_skips_that_series() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:broken@test\r\n\
DTSTART:20240101T090000Z\r\n\
DTEND:20240101T091500Z\r\n\
RRULE:FREQ=NEVER\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:fine@test\r\n\
DTSTART:20240101T090000Z\r\n\
DTEND:20240101T091500Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.skipped, 1);
        assert_eq!(feed.events.len(), 1);
    }

    #[test]
    fn test_non_calendar_input_fails() {
        assert!(matches!(
            parse_feed(b"<html>oops</html>", &source(), &horizon()),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_feed(&[0xff, 0xfe, 0x00], &source(), &horizon()),
            Err(ParseError::Encoding)
        ));
    }

    #[test]
    fn test_parse_line_folding_preserves_whitespace() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
UID:fold@test\r\n\
SUMMARY:Quarterly \r\n planning\r\n\
DTSTART:20240101T100000Z\r\n\
END:VEVENT\r\n",
        );

        let feed = parse_feed(ics.as_bytes(), &source(), &horizon()).unwrap();
        assert_eq!(feed.events[0].title, "Quarterly planning");
    }
}
