//! Error types for runtime adapter operations.

use std::fmt;

/// Errors any runtime backend can report, mapped from backend-specific failures.
#[derive(Debug)]
pub enum Error {
    /// The instance handle is unknown to the backend.
    NotFound(String),

    /// The backend refused or failed to launch an instance.
    Spawn(String),

    /// Local I/O failure talking to the backend or the instance.
    Io(std::io::Error),

    /// The adapter is misconfigured (missing command, bad arguments).
    Configuration(String),

    /// The backend could not be reached. Callers should not draw conclusions about
    /// instance liveness from this and should try again later.
    Unavailable(String),

    /// Catch-all for errors that don't fit other categories.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(handle) => write!(f, "Runtime instance not found: {}", handle),
            Error::Spawn(msg) => write!(f, "Failed to start runtime instance: {}", msg),
            Error::Io(err) => write!(f, "Runtime I/O error: {}", err),
            Error::Configuration(msg) => write!(f, "Invalid runtime configuration: {}", msg),
            Error::Unavailable(msg) => write!(f, "Runtime unavailable: {}", msg),
            Error::Other(err) => write!(f, "Other runtime error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Configuration(format!("unable to encode bot configuration: {err}"))
    }
}
