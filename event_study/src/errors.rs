use thiserror::Error;

/// The unified error type for the `event_study` crate.
///
/// Everything here is fatal: it aborts a run before any computation starts.
/// Per-event problems (an event outside the data, a window that runs off the
/// end of the series, a zero price) are not errors; they are recorded as
/// [`Exclusion`](crate::models::results::Exclusion) rows instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed run configuration (bad window spec, alpha out of range, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The price series violates its invariants (ordering, duplicates, non-finite prices).
    #[error("Invalid price series: {0}")]
    InvalidSeries(String),

    /// Two input events share the same identifier.
    #[error("Duplicate event id: {0}")]
    DuplicateEventId(String),

    /// A generic I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`StudyConfig`](crate::config::StudyConfig).
    #[error("Failed to parse configuration TOML")]
    Toml(#[from] toml::de::Error),

    /// An input adapter could not decode JSON.
    #[error("Failed to decode JSON input")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
