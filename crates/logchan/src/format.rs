//! Default single-line rendering of dispatched records

use crate::{record::LogRecord, stack::call_info};

/// `strftime` layout of the `time` field
pub const TIME_LAYOUT: &str = "%Y%m%d%H%M%S";

/// `time:…|session:…|thread:…|file:…|func:…|line:…` for a record's call site
pub fn default_print(record: &LogRecord) -> String {
    let metadata = record.metadata();
    let call = call_info(metadata);

    format!(
        "time:{}|session:{}|thread:{}|file:{}|func:{}|line:{}",
        metadata.timestamp().format(TIME_LAYOUT),
        metadata.session_id(),
        metadata.thread_id(),
        call.file,
        call.function,
        call.line
    )
}

/// `name|level|<default_print>` with `|error:…` appended when the event carries one
pub fn render_line(record: &LogRecord) -> String {
    let mut line = format!("{}|{}|{}", record.name(), record.level(), default_print(record));

    if let Some(error) = record.error() {
        line.push_str("|error:");
        line.push_str(&error.to_string());
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::HookError,
        event::{EventError, LogEvent, LogLevel, LogName},
        metadata::{Metadata, ThreadSeq},
        session::SessionId,
        stack::StackSnapshot,
    };
    use chrono::{Local, TimeZone};

    #[derive(Debug, thiserror::Error)]
    #[error("timeout after 3s")]
    struct Timeout;

    struct Call {
        err: Option<Timeout>,
    }

    impl LogEvent for Call {
        fn name(&self) -> LogName {
            LogName::from_static("Call")
        }
        fn error(&self) -> Option<&EventError> {
            self.err.as_ref().map(|e| e as &EventError)
        }
        fn level(&self) -> LogLevel {
            LogLevel::Warn
        }
        fn before_send(&mut self, _metadata: &Metadata) -> Result<(), HookError> {
            Ok(())
        }
    }

    fn record(err: Option<Timeout>) -> LogRecord {
        let timestamp = Local.with_ymd_and_hms(2024, 5, 17, 8, 30, 5).unwrap();
        let metadata = Metadata::new(
            ThreadSeq::default(),
            SessionId::compute("", 0, 0, 0),
            StackSnapshot::empty(),
            timestamp,
        );
        LogRecord::new(Box::new(Call { err }), metadata)
    }

    #[test]
    fn test_default_print_layout() {
        let record = record(None);
        let session = SessionId::compute("", 0, 0, 0);

        assert_eq!(
            default_print(&record),
            format!("time:20240517083005|session:{session}|thread:0|file:|func:|line:0")
        );
    }

    #[test]
    fn test_render_line_appends_error() {
        let with_error = render_line(&record(Some(Timeout)));
        let without_error = render_line(&record(None));

        assert!(with_error.starts_with("Call|warn|time:20240517083005|"));
        assert!(with_error.ends_with("|error:timeout after 3s"));
        assert!(!without_error.contains("error:"));
    }
}
