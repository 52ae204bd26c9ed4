//! Error types for the monitoring framework.

use thiserror::Error;

/// Errors that can occur while configuring or running a monitor.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Latency must be a positive, finite number of seconds.
    #[error("Invalid latency {0}: latency must be greater than zero")]
    InvalidLatency(f64),

    /// A path filter pattern failed to compile.
    #[error("Invalid filter pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern, exactly as supplied by the caller.
        pattern: String,
        /// The underlying compilation error.
        #[source]
        source: regex::Error,
    },

    /// The monitor's event loop is running right now.
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// The monitor's event loop has already run to completion; a monitor is
    /// a one-shot and cannot be restarted.
    #[error("Monitor has already finished and cannot be restarted")]
    Finished,

    /// The backend dropped change notifications and overflow events are not
    /// allowed for this monitor.
    #[error("Event queue overflowed")]
    Overflow,

    /// No backend is registered under the requested name or type.
    #[error("Unknown monitor type '{0}'")]
    UnknownMonitorType(String),

    /// A backend is already registered under this name.
    #[error("Monitor backend '{0}' is already registered")]
    DuplicateBackend(String),

    /// Native watcher failure inside the event loop.
    #[error("File watching error: {0}")]
    Watch(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal channel failure.
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type for monitoring operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convert notify errors to our error type.
impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

/// Convert flume receive errors to our error type.
impl From<flume::RecvError> for Error {
    fn from(err: flume::RecvError) -> Self {
        Error::Channel(format!("Channel receive error: {}", err))
    }
}
