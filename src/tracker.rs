//! Loaded configuration and calendar sources for one CLI invocation.

use anyhow::Result;
use caltrack_core::cache::FileCacheStore;
use caltrack_core::feed::HttpFetcher;
use caltrack_core::source::load_sources;
use caltrack_core::{CalTrackError, CalendarSource, Syncer, TimeMode, TrackerConfig};

pub type CliSyncer = Syncer<HttpFetcher, FileCacheStore>;

pub struct Tracker {
    config: TrackerConfig,
    sources: Vec<CalendarSource>,
}

impl Tracker {
    pub fn load() -> Result<Self> {
        let config = TrackerConfig::load()?;
        let sources = load_sources(&config.calendars_path())?;
        log::debug!(
            "Loaded {} calendar sources from {}",
            sources.len(),
            config.calendars_path().display()
        );

        Ok(Tracker { config, sources })
    }

    pub fn time_mode(&self) -> TimeMode {
        self.config.time_mode
    }

    pub fn syncer(&self) -> Result<CliSyncer> {
        let fetcher = HttpFetcher::new(self.config.sync.fetch_timeout)?;
        let store = FileCacheStore::new(self.config.cache_path());

        Ok(Syncer::new(fetcher, store, self.config.sync.clone()))
    }

    pub fn require_calendars(&self) -> Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!(
                "No calendars configured.\n\n\
                Add your feeds to {}:\n  \
                {{\"calendars\": [{{\"url\": \"https://example.com/work.ics\", \"custom_name\": \"Work\"}}]}}",
                self.config.calendars_path().display()
            );
        }

        Ok(())
    }

    /// All sources, or the one matching `filter` by name or id.
    pub fn resolve_calendars(&self, filter: Option<&str>) -> Result<Vec<CalendarSource>> {
        match filter {
            Some(query) => Ok(vec![self.resolve_calendar(query)?]),
            None => Ok(self.sources.clone()),
        }
    }

    pub fn resolve_calendar(&self, query: &str) -> Result<CalendarSource> {
        match self.sources.iter().find(|s| s.matches(query)) {
            Some(source) => Ok(source.clone()),
            None => {
                let available: Vec<_> = self.sources.iter().map(|s| s.name.as_str()).collect();
                Err(CalTrackError::CalendarNotFound(format!(
                    "'{}'. Available: {}",
                    query,
                    available.join(", ")
                ))
                .into())
            }
        }
    }
}
