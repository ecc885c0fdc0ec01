//! The capability set every dispatched event satisfies

use crate::{error::HookError, metadata::Metadata};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Business error carried by an event
pub type EventError = dyn std::error::Error + Send + Sync + 'static;

/// Stable, printable identifier handlers use to tell event variants apart
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogName(Cow<'static, str>);

impl LogName {
    /// Name backed by a static string, usable in `const` items
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Name built at runtime
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for LogName {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for LogName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Event severity, from `Off` (never emitted) to `All`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    All,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::All => "all",
        }
    }

    /// Closest `tracing` level; `None` for [`LogLevel::Off`]
    pub fn to_tracing(self) -> Option<tracing::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Fatal | LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace | LogLevel::All => Some(tracing::Level::TRACE),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "all" => Ok(LogLevel::All),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Downcasting support, implemented for every `'static` type
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A loggable occurrence.
///
/// Every method is required. The dispatcher only ever looks at this capability set;
/// concrete fields stay private to the variant and are reachable from handlers through
/// [`LogRecord::downcast_ref`](crate::LogRecord::downcast_ref).
pub trait LogEvent: AsAny + Send + 'static {
    /// Variant identifier
    fn name(&self) -> LogName;

    /// Business error attached to the occurrence, if any
    fn error(&self) -> Option<&EventError>;

    fn level(&self) -> LogLevel;

    /// Runs once on the producer thread, after enrichment and before enqueue.
    ///
    /// Use it to derive display fields from the event and its metadata. A returned
    /// error is logged at debug level and dropped; the event is still sent.
    fn before_send(&mut self, metadata: &Metadata) -> Result<(), HookError>;
}
