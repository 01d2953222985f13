//! Global caltrack configuration.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::TimeDelta;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer, de};

use crate::error::{CalTrackError, CalTrackResult};
use crate::time_mode::TimeMode;

static DEFAULT_CACHE_DIR: &str = "~/.cache/caltrack";
static DEFAULT_CALENDARS_FILE: &str = "~/.config/caltrack/calendars.json";

pub const DEFAULT_TTL: TimeDelta = TimeDelta::hours(24);
pub const DEFAULT_EARLY_REFRESH: TimeDelta = TimeDelta::minutes(5);
pub const DEFAULT_TRUST_WINDOW: TimeDelta = TimeDelta::days(30);
pub const DEFAULT_FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(30);
pub const DEFAULT_LOOKBACK: TimeDelta = TimeDelta::days(365);
pub const DEFAULT_LOOKAHEAD: TimeDelta = TimeDelta::days(365);

const ENV_PREFIX: &str = "CALTRACK";

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_calendars_file() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDARS_FILE)
}

fn parse_delta<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
    let std = parse_std(deserializer)?;
    TimeDelta::from_std(std).map_err(de::Error::custom)
}

fn parse_std<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StdDuration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(de::Error::custom)
}

/// Timing knobs for syncing and merging.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SyncPolicy {
    /// How long a synced calendar stays fresh.
    #[serde(deserialize_with = "parse_delta")]
    pub ttl: TimeDelta,

    /// Refresh this much before the TTL actually runs out.
    #[serde(deserialize_with = "parse_delta")]
    pub early_refresh: TimeDelta,

    /// How far back a fresh feed is authoritative.
    #[serde(deserialize_with = "parse_delta")]
    pub trust_window: TimeDelta,

    #[serde(deserialize_with = "parse_std")]
    pub fetch_timeout: StdDuration,

    /// Recurring events are expanded from `now - lookback`...
    #[serde(deserialize_with = "parse_delta")]
    pub lookback: TimeDelta,

    /// ...up to `now + lookahead`.
    #[serde(deserialize_with = "parse_delta")]
    pub lookahead: TimeDelta,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            ttl: DEFAULT_TTL,
            early_refresh: DEFAULT_EARLY_REFRESH,
            trust_window: DEFAULT_TRUST_WINDOW,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            lookback: DEFAULT_LOOKBACK,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

/// Global configuration at ~/.config/caltrack/config.toml
///
/// Every key can be overridden from the environment, e.g.
/// `CALTRACK_TIME_MODE=utc` or `CALTRACK_SYNC__TTL=6h`.
#[derive(Deserialize, Clone, Debug)]
pub struct TrackerConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_calendars_file")]
    pub calendars_file: PathBuf,

    #[serde(default)]
    pub time_mode: TimeMode,

    #[serde(default)]
    pub sync: SyncPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            cache_dir: default_cache_dir(),
            calendars_file: default_calendars_file(),
            time_mode: TimeMode::default(),
            sync: SyncPolicy::default(),
        }
    }
}

impl TrackerConfig {
    pub fn config_path() -> CalTrackResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalTrackError::Config("Could not determine config directory".into()))?
            .join("caltrack");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented template first if
    /// no config file exists yet.
    pub fn load() -> CalTrackResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CalTrackResult<Self> {
        Self::build(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    fn build(path: &Path, environment: Environment) -> CalTrackResult<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(environment)
            .build()
            .map_err(|e| CalTrackError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalTrackError::Config(e.to_string()))
    }

    pub fn cache_path(&self) -> PathBuf {
        expand(&self.cache_dir)
    }

    pub fn calendars_path(&self) -> PathBuf {
        expand(&self.calendars_file)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalTrackResult<()> {
        let contents = format!(
            "\
# caltrack configuration

# Where synced calendars are cached:
# cache_dir = \"{}\"

# Calendar sources (calendars.json, or calendars.txt with `url # name` lines):
# calendars_file = \"{}\"

# Wall clock used to split events into days: local, utc, naive or an IANA zone
# time_mode = \"local\"

# [sync]
# ttl = \"24h\"
# early_refresh = \"5m\"
# trust_window = \"30days\"
# fetch_timeout = \"30s\"
# lookback = \"365days\"
# lookahead = \"365days\"
",
            DEFAULT_CACHE_DIR, DEFAULT_CALENDARS_FILE
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalTrackError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalTrackError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env() -> Environment {
        TrackerConfig::environment().source(Some(HashMap::new()))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::build(&dir.path().join("config.toml"), no_env()).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(config.time_mode, TimeMode::Local);
        assert_eq!(config.sync, SyncPolicy::default());
    }

    #[test]
    fn test_default_template_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caltrack").join("config.toml");
        TrackerConfig::create_default_config(&path).unwrap();

        let config = TrackerConfig::build(&path, no_env()).unwrap();
        assert_eq!(config.sync, SyncPolicy::default());
        assert_eq!(config.calendars_file, PathBuf::from(DEFAULT_CALENDARS_FILE));
    }

    #[test]
    fn test_file_values_and_humantime_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "cache_dir = \"/var/cache/ct\"\ntime_mode = \"utc\"\n\n[sync]\nttl = \"6h\"\ntrust_window = \"2weeks\"\nfetch_timeout = \"5s\"\n",
        )
        .unwrap();

        let config = TrackerConfig::build(&path, no_env()).unwrap();
        assert_eq!(config.cache_path(), PathBuf::from("/var/cache/ct"));
        assert_eq!(config.time_mode, TimeMode::Utc);
        assert_eq!(config.sync.ttl, TimeDelta::hours(6));
        assert_eq!(config.sync.trust_window, TimeDelta::days(14));
        assert_eq!(config.sync.fetch_timeout, StdDuration::from_secs(5));
        assert_eq!(config.sync.early_refresh, DEFAULT_EARLY_REFRESH);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "time_mode = \"utc\"\n").unwrap();

        let env = TrackerConfig::environment().source(Some(HashMap::from([
            ("CALTRACK_TIME_MODE".to_string(), "naive".to_string()),
            ("CALTRACK_SYNC__LOOKAHEAD".to_string(), "90days".to_string()),
        ])));

        let config = TrackerConfig::build(&path, env).unwrap();
        assert_eq!(config.time_mode, TimeMode::Naive);
        assert_eq!(config.sync.lookahead, TimeDelta::days(90));
    }

    #[test]
    fn test_invalid_duration_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nttl = \"soon\"\n").unwrap();

        let err = TrackerConfig::build(&path, no_env()).unwrap_err();
        assert!(matches!(err, CalTrackError::Config(_)));
    }

    #[test]
    fn test_tilde_paths_are_expanded() {
        let config = TrackerConfig::default();
        assert!(!config.cache_path().to_string_lossy().starts_with('~'));
    }
}
