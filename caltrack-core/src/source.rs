//! Calendar source list.
//!
//! Sources come from `calendars.json`:
//!
//! ```json
//! { "calendars": [ { "url": "https://…/work.ics", "custom_name": "Work",
//!                    "category": "Job", "color": "#ff8800" } ] }
//! ```
//!
//! or, when no JSON file exists, from `calendars.txt` with one `url # name`
//! entry per line. Lines starting with `#` are comments.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CalTrackError, CalTrackResult};
use crate::event::CalendarId;

/// Display name used when a source has none.
pub const UNNAMED: &str = "Unnamed";

/// Prefix marking calendars merged from uploaded files.
const IMPORTED_PREFIX: &str = "[Imported] ";

/// One configured calendar feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub url: String,
    pub name: String,
    pub category: Option<String>,
    pub color: Option<String>,
}

impl CalendarSource {
    pub fn new(url: &str, name: &str) -> Self {
        CalendarSource {
            url: url.trim().to_string(),
            name: name.to_string(),
            category: None,
            color: None,
        }
    }

    pub fn id(&self) -> CalendarId {
        CalendarId::from_url(&self.url)
    }

    /// Category of the calendar, defaulting to its display name.
    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(&self.name)
    }

    pub fn is_unnamed(&self) -> bool {
        self.name == UNNAMED
    }

    /// Whether `query` names this calendar (display name or id).
    pub fn matches(&self, query: &str) -> bool {
        self.name.eq_ignore_ascii_case(query) || self.id().to_string() == query
    }
}

#[derive(Deserialize)]
struct CalendarsFile {
    calendars: Vec<CalendarsFileEntry>,
}

#[derive(Deserialize)]
struct CalendarsFileEntry {
    url: String,
    #[serde(default)]
    custom_name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

/// Load sources from `path`, falling back to a `.txt` file next to it.
///
/// Returns an empty list when neither file exists.
pub fn load_sources(path: &Path) -> CalTrackResult<Vec<CalendarSource>> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        return if path.extension().is_some_and(|e| e == "txt") {
            Ok(parse_txt_sources(&content))
        } else {
            parse_json_sources(&content)
        };
    }

    let txt_path = path.with_extension("txt");
    if txt_path.exists() {
        let content = std::fs::read_to_string(&txt_path)?;
        return Ok(parse_txt_sources(&content));
    }

    Ok(Vec::new())
}

/// Parse the JSON source list and fill in missing colors.
pub fn parse_json_sources(content: &str) -> CalTrackResult<Vec<CalendarSource>> {
    let file: CalendarsFile =
        serde_json::from_str(content).map_err(|e| CalTrackError::Config(e.to_string()))?;

    let mut sources: Vec<CalendarSource> = file
        .calendars
        .into_iter()
        .map(|entry| {
            let name = entry
                .custom_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNNAMED.to_string());
            CalendarSource {
                url: entry.url.trim().to_string(),
                name,
                category: entry.category.filter(|c| !c.trim().is_empty()),
                color: entry.color.filter(|c| !c.trim().is_empty()),
            }
        })
        .collect();

    assign_colors(&mut sources);
    Ok(sources)
}

/// Parse `url # name` lines.
///
/// Every calendar of the same name shares one color.
pub fn parse_txt_sources(content: &str) -> Vec<CalendarSource> {
    let entries: Vec<(&str, &str)> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once('#') {
            Some((url, name)) => (url.trim(), name.trim()),
            None => (line, ""),
        })
        .collect();

    let total = entries.len();
    let mut colors: HashMap<String, String> = HashMap::new();

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (url, name))| {
            let name = if name.is_empty() { UNNAMED } else { name };
            let color = colors
                .entry(name.to_string())
                .or_insert_with(|| distinct_color(index, total))
                .clone();
            CalendarSource {
                url: url.to_string(),
                name: name.to_string(),
                category: None,
                color: Some(color),
            }
        })
        .collect()
}

/// Give each source without a color an evenly spaced hue.
fn assign_colors(sources: &mut [CalendarSource]) {
    let total = sources.len();
    let mut next = 0;

    for source in sources.iter_mut().filter(|s| s.color.is_none()) {
        source.color = Some(distinct_color(next, total));
        next += 1;
    }
}

/// Color number `index` of `total` hues spread around the wheel.
pub fn distinct_color(index: usize, total: usize) -> String {
    let hue = index as f64 / total.max(1) as f64;
    let (r, g, b) = hls_to_rgb(hue, 0.5, 0.7);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0) as u8,
        (g * 255.0) as u8,
        (b * 255.0) as u8
    )
}

fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    (
        hue_channel(m1, m2, h + 1.0 / 3.0),
        hue_channel(m1, m2, h),
        hue_channel(m1, m2, h - 1.0 / 3.0),
    )
}

fn hue_channel(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < 1.0 / 6.0 {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < 2.0 / 3.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
    } else {
        m1
    }
}

/// Strip the import tag from a calendar name.
pub fn normalize_calendar_name(name: &str) -> &str {
    name.strip_prefix(IMPORTED_PREFIX).unwrap_or(name).trim()
}
