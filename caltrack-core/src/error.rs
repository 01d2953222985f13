//! Error types for caltrack.

use thiserror::Error;

/// Why a feed could not be fetched.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid feed URL '{0}'")]
    InvalidUrl(String),

    #[error("Feed request timed out after {}", humantime::format_duration(*.0))]
    Timeout(std::time::Duration),

    #[error("Feed server answered with HTTP {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not read feed file: {0}")]
    File(#[from] std::io::Error),
}

/// Why raw feed bytes could not be turned into events.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Feed is not valid UTF-8")]
    Encoding,

    #[error("Malformed calendar data: {0}")]
    Malformed(String),

    #[error("Invalid recurrence rule for event '{uid}': {reason}")]
    Recurrence { uid: String, reason: String },
}

/// Errors that can occur in caltrack operations.
#[derive(Error, Debug)]
pub enum CalTrackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("ICS parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cache IO error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Cache file {path} is corrupt: {reason}")]
    CacheCorrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for caltrack operations.
pub type CalTrackResult<T> = Result<T, CalTrackError>;
