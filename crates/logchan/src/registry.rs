//! Ordered set of handlers that receive every dispatched event

use crate::{
    event::{EventError, LogName},
    record::LogRecord,
};
use std::fmt;
use std::sync::Arc;

/// Receives dispatched events on the consumer thread.
///
/// Handlers run one after another for each event, so a slow handler delays every
/// later handler and every later event. A panic stops delivery for the dispatcher.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, record: &LogRecord, name: &LogName, error: Option<&EventError>);

    /// Human-readable name (for diagnostics)
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning a closure into a [`Handler`]
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&LogRecord, &LogName, Option<&EventError>) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&LogRecord, &LogName, Option<&EventError>) + Send + Sync + 'static,
{
    fn handle(&self, record: &LogRecord, name: &LogName, error: Option<&EventError>) {
        (self.0)(record, name, error)
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Handlers in registration order
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: Handler>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    /// Register if present; `None` is skipped and never invoked
    pub fn register_opt<H: Handler>(&mut self, handler: Option<H>) {
        if let Some(handler) = handler {
            self.register(handler);
        }
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn register_fn<F>(&mut self, f: F)
    where
        F: Fn(&LogRecord, &LogName, Option<&EventError>) + Send + Sync + 'static,
    {
        self.register(FnHandler::new(f));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler against `record`, in registration order
    pub fn dispatch(&self, record: &LogRecord) {
        let name = record.name();
        let error = record.error();

        for handler in &self.handlers {
            handler.handle(record, &name, error);
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}
