//! End-to-end: TOML config, file-backed writer handler, graceful shutdown

use logchan::{
    handlers::writer_handler, Dispatcher, DrainOutcome, EventError, HookError, LogEvent,
    LogLevel, LogName, LogWriter, LogchanConfig, Metadata,
};
use std::fmt;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug)]
struct Refused;

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection refused")
    }
}

impl std::error::Error for Refused {}

struct Payment {
    id: u32,
    err: Option<Refused>,
}

impl LogEvent for Payment {
    fn name(&self) -> LogName {
        LogName::new(format!("Payment{}", self.id))
    }
    fn error(&self) -> Option<&EventError> {
        self.err.as_ref().map(|e| e as &EventError)
    }
    fn level(&self) -> LogLevel {
        if self.err.is_some() {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }
    fn before_send(&mut self, _metadata: &Metadata) -> Result<(), HookError> {
        Ok(())
    }
}

async fn load_config(dir: &TempDir) -> LogchanConfig {
    let config_path = dir.path().join("logchan.toml");
    let format = dir.path().join("logs/{appName}.log");
    let toml = format!(
        r#"
        [dispatcher]
        queue_capacity = 16
        thread_name = "payments-log"

        [dispatcher.sink]
        file_format = "{}"
        app_name = "payments"
        "#,
        format.display()
    );
    tokio::fs::write(&config_path, toml).await.unwrap();

    LogchanConfig::load(Some(&config_path)).await.unwrap()
}

#[tokio::test]
async fn test_events_written_to_configured_file() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir).await;
    config.validate().unwrap();

    let writer = LogWriter::open(&config.dispatcher.sink).unwrap();
    let dispatcher = Dispatcher::new(config.dispatcher).unwrap();
    dispatcher.set_writer(writer_handler(writer)).unwrap();

    dispatcher.send(Payment { id: 1, err: None });
    dispatcher.send(Payment {
        id: 2,
        err: Some(Refused),
    });

    let outcome = dispatcher.shutdown(Duration::from_secs(2)).await;
    assert_eq!(outcome, DrainOutcome::Drained);

    let content = tokio::fs::read_to_string(dir.path().join("logs/payments.log"))
        .await
        .unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Payment1|info|time:"));
    assert!(lines[1].starts_with("Payment2|error|time:"));
    assert!(lines[1].ends_with("|error:connection refused"));
    assert!(!lines[0].contains("error:"));
}

#[tokio::test]
async fn test_handler_panic_reported_to_file_sink() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir).await;

    let dispatcher = Dispatcher::new(config.dispatcher).unwrap();
    dispatcher.register_fn(|_record, _name, _err| panic!("ledger unavailable"));
    dispatcher.start().unwrap();

    dispatcher.send(Payment { id: 7, err: None });
    let outcome = dispatcher.shutdown(Duration::from_secs(2)).await;
    assert_eq!(outcome, DrainOutcome::ConsumerStopped);

    let content = tokio::fs::read_to_string(dir.path().join("logs/payments.log"))
        .await
        .unwrap();
    assert!(content.contains("Payment7"));
    assert!(content.contains("ledger unavailable"));
}
