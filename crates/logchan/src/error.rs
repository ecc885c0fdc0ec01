//! Error types for the dispatcher and its collaborators

/// Result type for logchan operations
pub type Result<T> = std::result::Result<T, LogchanError>;

/// Error produced inside an event's pre-send hook.
///
/// Hook errors are logged and discarded by the dispatcher; they never replace the
/// error carried by the event itself.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Logchan-specific errors
#[derive(thiserror::Error, Debug)]
pub enum LogchanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Event type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Sink error: {message}")]
    Sink { message: String },

    #[error("Telemetry error: {message}")]
    Telemetry { message: String },
}
