//! An event paired with the metadata captured when it was sent

use crate::{
    error::{LogchanError, Result},
    event::{EventError, LogEvent, LogLevel, LogName},
    metadata::Metadata,
};
use std::fmt;

/// What handlers receive: the sent event and its enrichment
pub struct LogRecord {
    event: Box<dyn LogEvent>,
    metadata: Metadata,
}

impl LogRecord {
    pub fn new(event: Box<dyn LogEvent>, metadata: Metadata) -> Self {
        Self { event, metadata }
    }

    pub fn event(&self) -> &dyn LogEvent {
        self.event.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn name(&self) -> LogName {
        self.event().name()
    }

    pub fn level(&self) -> LogLevel {
        self.event().level()
    }

    pub fn error(&self) -> Option<&EventError> {
        self.event().error()
    }

    /// Concrete event variant, or [`LogchanError::TypeMismatch`] if the record holds another
    pub fn downcast_ref<T: LogEvent>(&self) -> Result<&T> {
        let event = self.event();
        event
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| LogchanError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: event.type_name(),
            })
    }

    pub fn into_parts(self) -> (Box<dyn LogEvent>, Metadata) {
        (self.event, self.metadata)
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("event_type", &self.event().type_name())
            .field("metadata", &self.metadata)
            .finish()
    }
}
