//! Ready-made handlers: a line writer and a bridge into `tracing`

use crate::{
    event::{EventError, LogLevel, LogName},
    format::render_line,
    record::LogRecord,
    registry::Handler,
    sink::LogWriter,
    stack::call_info,
};

/// Writes [`render_line`] output to a [`LogWriter`]
#[derive(Debug, Clone)]
pub struct WriterHandler {
    writer: LogWriter,
}

impl WriterHandler {
    pub fn new(writer: LogWriter) -> Self {
        Self { writer }
    }
}

impl Handler for WriterHandler {
    fn handle(&self, record: &LogRecord, _name: &LogName, _error: Option<&EventError>) {
        if let Err(e) = self.writer.write_line(&render_line(record)) {
            tracing::warn!(
                logchan.event = "writer_failed",
                target = self.writer.target(),
                error = %e,
                "Failed to write log line"
            );
        }
    }

    fn name(&self) -> &'static str {
        "writer"
    }
}

/// Re-emits every record as a `tracing` event at the record's level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHandler;

macro_rules! emit_at {
    ($level:expr, $record:expr, $name:expr, $error:expr) => {{
        let metadata = $record.metadata();
        let call = call_info(metadata);
        tracing::event!(
            target: "logchan::dispatch",
            $level,
            logchan.name = %$name,
            logchan.session = %metadata.session_id(),
            logchan.thread = metadata.thread_id().as_u64(),
            logchan.file = %call.file,
            logchan.function = %call.function,
            logchan.line = call.line,
            error = $error,
            "{}",
            $name
        );
    }};
}

impl Handler for TracingHandler {
    fn handle(&self, record: &LogRecord, name: &LogName, error: Option<&EventError>) {
        let error = error.map(tracing::field::display);

        match record.level() {
            LogLevel::Off => {}
            LogLevel::Fatal | LogLevel::Error => {
                emit_at!(tracing::Level::ERROR, record, name, error)
            }
            LogLevel::Warn => emit_at!(tracing::Level::WARN, record, name, error),
            LogLevel::Info => emit_at!(tracing::Level::INFO, record, name, error),
            LogLevel::Debug => emit_at!(tracing::Level::DEBUG, record, name, error),
            LogLevel::Trace | LogLevel::All => {
                emit_at!(tracing::Level::TRACE, record, name, error)
            }
        }
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

pub fn writer_handler(writer: LogWriter) -> WriterHandler {
    WriterHandler::new(writer)
}

pub fn tracing_handler() -> TracingHandler {
    TracingHandler
}
