//! # Logchan
//!
//! In-process, non-blocking dispatch of structured log events.
//!
//! Producers on any thread hand events to a [`Dispatcher`]; a single background
//! consumer thread drains them in FIFO order and runs every registered handler
//! against each one.
//!
//! ## Pipeline
//!
//! ```text
//! send(event) ──► Enricher ──► before_send ──► [bounded queue] ──► consumer thread
//!   (producer      (thread, session,             try_send,           │
//!    thread)        stack, timestamp)            drop on full        ├─► handler 1
//!                                                                    ├─► handler 2
//!                                                                    └─► handler N
//! ```
//!
//! ## Features
//!
//! - **Never blocks producers**: a full or closed queue drops the event and counts it
//! - **Call-site enrichment**: thread id, session id, lazily resolved call stack, timestamp
//! - **Graceful shutdown**: [`Dispatcher::shutdown`] closes intake and waits for the drain
//! - **Panic isolation**: a panicking handler stops delivery, never the host process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use logchan::{Dispatcher, DispatcherConfig, EventError, HookError, LogEvent, LogLevel, LogName, Metadata};
//!
//! struct Started;
//!
//! impl LogEvent for Started {
//!     fn name(&self) -> LogName {
//!         LogName::from_static("Started")
//!     }
//!     fn error(&self) -> Option<&EventError> {
//!         None
//!     }
//!     fn level(&self) -> LogLevel {
//!         LogLevel::Info
//!     }
//!     fn before_send(&mut self, _metadata: &Metadata) -> Result<(), HookError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> logchan::Result<()> {
//!     let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//!     dispatcher.register_fn(|record, name, _err| {
//!         println!("{name} from {}", record.metadata().session_id());
//!     });
//!     dispatcher.start()?;
//!
//!     dispatcher.send(Started);
//!     dispatcher.shutdown(Duration::from_secs(1)).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod enricher;
pub mod error;
pub mod event;
pub mod format;
pub mod handlers;
pub mod metadata;
pub mod record;
pub mod registry;
pub mod session;
pub mod sink;
pub mod stack;
pub mod telemetry;


pub use config::{DispatcherConfig, LogFormat, LogchanConfig, SinkConfig, TelemetryConfig};
pub use dispatcher::{ConsumerState, Dispatcher, DispatcherStats, DrainOutcome};
pub use enricher::Enricher;
pub use error::{HookError, LogchanError, Result};
pub use event::{EventError, LogEvent, LogLevel, LogName};
pub use metadata::{Metadata, ThreadSeq};
pub use record::LogRecord;
pub use registry::{Handler, HandlerRegistry};
pub use session::{session_id, SessionId};
pub use sink::LogWriter;
pub use stack::{
    call_info, default_frames_filter, get_call_stack_info_from_frames, CallInfo, CallerFrames,
    Frame, StackSnapshot,
};
