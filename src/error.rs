//! Error types for the twin health pipeline.

use thiserror::Error;

/// Errors raised while turning a telemetry event into twin graph updates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TwinError {
    /// Malformed or unusable telemetry payload.
    #[error("Failed to parse telemetry: {0}")]
    Parse(String),

    /// No sensor twin carries the given device id.
    #[error("No sensor twin found for device {0}")]
    NotFound(String),

    /// Query or patch rejected by the twin graph store.
    #[error("Twin graph request failed: {0}")]
    Store(String),

    /// Could not reach the twin graph store.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials rejected or missing.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Threshold lookup for a category name that has no limit.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

impl TwinError {
    /// Whether this error invalidates the client connection.
    ///
    /// Parse errors are local to the event; everything else means the
    /// shared client is suspect and must be re-established.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, TwinError::Parse(_))
    }
}

impl From<reqwest::Error> for TwinError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            TwinError::Connection(err.to_string())
        } else if err.is_decode() {
            TwinError::Store(format!("unreadable response: {err}"))
        } else {
            TwinError::Store(err.to_string())
        }
    }
}

/// Errors loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not specified")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// A single event that could not be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFailure {
    /// Position of the event within its batch.
    pub index: usize,
    pub device_id: Option<String>,
    pub error: TwinError,
}

impl std::fmt::Display for EventFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.device_id {
            Some(id) => write!(f, "event #{} (device {}): {}", self.index, id, self.error),
            None => write!(f, "event #{}: {}", self.index, self.error),
        }
    }
}

/// Batch-level failure surfaced to the transport so it can redeliver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    /// The client could not be connected; no event was consumed.
    #[error("Twin graph unavailable, batch not processed: {0}")]
    Unavailable(TwinError),

    /// Exactly one event failed.
    #[error("{0}")]
    Event(EventFailure),

    /// More than one event failed.
    #[error("{} events failed: {}", .0.len(), join_failures(.0))]
    Aggregate(Vec<EventFailure>),
}

impl BatchError {
    /// Failures recorded against individual events.
    pub fn failures(&self) -> &[EventFailure] {
        match self {
            BatchError::Unavailable(_) => &[],
            BatchError::Event(failure) => std::slice::from_ref(failure),
            BatchError::Aggregate(failures) => failures,
        }
    }
}

fn join_failures(failures: &[EventFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
