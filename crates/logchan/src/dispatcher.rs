//! # Bounded, non-blocking dispatch to a single consumer thread
//!
//! ```text
//! producer threads                     consumer thread
//! ───────────────                      ───────────────
//! send(event)
//!   ├─► enrich + before_send
//!   └─► try_send ──► [queue: capacity N] ──► blocking_recv
//!         │                                    └─► handler 1 … handler N (sequential)
//!         └─ full/closed → dropped, counted
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `send` never waits for queue space; a full or closed queue drops the event
//! - **FIFO**: an event whose enqueue completed before another began is delivered first
//! - **Sequential handlers**: handler N+1 starts after handler N returns; the next event
//!   waits for the whole handler pass
//! - **Single use**: `NotStarted → Running → Draining → Stopped`, never back to `Running`
//!
//! ## Panic handling
//! A panic during a handler pass is caught at the loop boundary and reported to the
//! fallback [`LogWriter`]. Delivery then stops for good: buffered events are discarded
//! and the consumer moves to [`ConsumerState::Stopped`]. The host process is unaffected.
//!
//! ## Registration race
//! The handler set is snapshotted when [`Dispatcher::start`] wins its one-time guard.
//! Handlers registered after that point, including from threads racing with `start`,
//! are never invoked.

use crate::{
    config::DispatcherConfig,
    enricher::Enricher,
    error::{LogchanError, Result},
    event::{AsAny, EventError, LogEvent, LogName},
    record::LogRecord,
    registry::{Handler, HandlerRegistry},
    sink::LogWriter,
};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};

/// Lifecycle of the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

/// How a wait for delivery ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Every accepted event went through the full handler pass
    Drained,
    /// The deadline passed with events still pending
    TimedOut,
    /// The consumer stopped after a handler panic with events undelivered
    ConsumerStopped,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Events that entered the queue
    pub accepted: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
    /// Events whose handler pass completed
    pub delivered: u64,
    /// Accepted events whose handler pass has not finished
    pub pending: usize,
    /// Accepted events thrown away after the consumer stopped on a panic
    pub discarded: u64,
    pub state: ConsumerState,
}

// State shared between producers, the consumer thread and waiters.
struct Shared {
    pending: AtomicUsize,
    accepted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicBool,
    state: watch::Sender<ConsumerState>,
    idle: Notify,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConsumerState::NotStarted);
        Self {
            pending: AtomicUsize::new(0),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            panicked: AtomicBool::new(false),
            state,
            idle: Notify::new(),
        }
    }

    fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    fn transition(&self, from: &[ConsumerState], to: ConsumerState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("logchan.events.dropped").increment(1);
    }

    // One accepted event left the pipeline.
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Owns the dispatch queue, the handler registry and the consumer thread.
///
/// Share it between producers as `Arc<Dispatcher>`. Dropping the last handle closes
/// the queue; the consumer still drains what was buffered.
pub struct Dispatcher {
    config: DispatcherConfig,
    enricher: Enricher,
    sender: RwLock<Option<mpsc::Sender<LogRecord>>>,
    receiver: Mutex<Option<mpsc::Receiver<LogRecord>>>,
    registry: Mutex<HandlerRegistry>,
    fallback: LogWriter,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Build a dispatcher; the consumer is not started yet
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let fallback = LogWriter::open(&config.sink)?;
        Ok(Self::build(config, fallback))
    }

    /// Like [`Dispatcher::new`] with an explicit fallback sink for failure reports
    pub fn with_fallback(config: DispatcherConfig, fallback: LogWriter) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, fallback))
    }

    fn build(config: DispatcherConfig, fallback: LogWriter) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        Self {
            enricher: Enricher::from_config(&config),
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            registry: Mutex::new(HandlerRegistry::new()),
            fallback,
            shared: Arc::new(Shared::new()),
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.queue_capacity
    }

    pub fn register_handler<H: Handler>(&self, handler: H) {
        self.with_registry(|registry| registry.register(handler));
    }

    /// Register if present; `None` is ignored
    pub fn register_handler_opt<H: Handler>(&self, handler: Option<H>) {
        self.with_registry(|registry| registry.register_opt(handler));
    }

    pub fn register_fn<F>(&self, f: F)
    where
        F: Fn(&LogRecord, &LogName, Option<&EventError>) + Send + Sync + 'static,
    {
        self.with_registry(|registry| registry.register_fn(f));
    }

    fn with_registry(&self, f: impl FnOnce(&mut HandlerRegistry)) {
        let started = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        if started {
            tracing::warn!(
                logchan.event = "late_registration",
                "Handler registered after the consumer started; it will not be invoked"
            );
        }
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut registry);
    }

    /// Register `handler` and start the consumer
    pub fn set_writer<H: Handler>(&self, handler: H) -> Result<()> {
        self.register_handler(handler);
        self.start()
    }

    /// Start the consumer thread. Only the first call has any effect.
    pub fn start(&self) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            return Ok(());
        };

        let handlers = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let shared = Arc::clone(&self.shared);
        let fallback = self.fallback.clone();

        self.shared
            .transition(&[ConsumerState::NotStarted], ConsumerState::Running);

        let spawned = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || consume(receiver, handlers, shared, fallback));

        match spawned {
            Ok(_) => {
                tracing::debug!(
                    logchan.event = "consumer_started",
                    capacity = self.config.queue_capacity,
                    "Dispatch consumer started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.state.send_replace(ConsumerState::Stopped);
                self.shared.idle.notify_waiters();
                Err(LogchanError::Io(e))
            }
        }
    }

    /// Enrich `event`, run its pre-send hook and offer it to the queue.
    ///
    /// Returns immediately. The event is dropped when the queue is full or closed.
    #[inline(never)]
    pub fn send<E: LogEvent>(&self, event: E) {
        self.send_boxed(Box::new(event));
    }

    #[inline(never)]
    pub fn send_boxed(&self, mut event: Box<dyn LogEvent>) {
        let metadata = self.enricher.enrich();

        if let Err(e) = event.before_send(&metadata) {
            tracing::debug!(
                logchan.event = "before_send_failed",
                name = %event.name(),
                error = %e,
                "Pre-send hook failed, sending event unchanged"
            );
        }

        let record = LogRecord::new(event, metadata);
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            self.shared.record_drop();
            return;
        };

        // Counted before the offer so the consumer can never finish an event first.
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(record) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("logchan.events.accepted").increment(1);
            }
            Err(_) => {
                self.shared.finish_one();
                self.shared.record_drop();
            }
        }
    }

    /// Stop accepting events. Buffered events are still delivered.
    pub fn close(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if sender.is_some() {
            self.shared.transition(
                &[ConsumerState::NotStarted, ConsumerState::Running],
                ConsumerState::Draining,
            );
            tracing::debug!(logchan.event = "queue_closed", "Dispatch queue closed");
        }
    }

    /// Wait until every accepted event has been handled, without closing the queue.
    ///
    /// Returns early with [`DrainOutcome::ConsumerStopped`] if delivery stopped after a
    /// handler panic.
    pub async fn drain(&self, timeout: Duration) -> DrainOutcome {
        let shared = &self.shared;
        let wait = async {
            let mut state = shared.state.subscribe();
            loop {
                let idle = shared.idle.notified();
                if shared.pending.load(Ordering::Acquire) == 0 {
                    return DrainOutcome::Drained;
                }
                if *state.borrow_and_update() == ConsumerState::Stopped {
                    return DrainOutcome::ConsumerStopped;
                }
                tokio::select! {
                    _ = idle => {}
                    _ = state.changed() => {}
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(DrainOutcome::TimedOut)
    }

    /// Close the queue and wait for the consumer to finish the buffered events.
    ///
    /// Returns [`DrainOutcome::ConsumerStopped`] when the consumer stopped on a handler
    /// panic instead of draining the queue.
    pub async fn shutdown(&self, timeout: Duration) -> DrainOutcome {
        self.close();

        let mut state = self.shared.state.subscribe();
        let stopped = state.wait_for(|s| *s == ConsumerState::Stopped);
        let stopped = tokio::time::timeout(timeout, stopped).await.is_ok();

        if !stopped {
            DrainOutcome::TimedOut
        } else if self.shared.panicked.load(Ordering::Acquire) {
            DrainOutcome::ConsumerStopped
        } else {
            DrainOutcome::Drained
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.shared.state()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            pending: self.shared.pending.load(Ordering::Acquire),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            state: self.shared.state(),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// Moves the consumer to `Stopped` however the loop exits, unwinding included.
struct StopOnExit<'a>(&'a Shared);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.panicked.store(true, Ordering::Release);
        }
        self.0.state.send_replace(ConsumerState::Stopped);
        self.0.idle.notify_waiters();
    }
}

// One received event; releases its pending slot when dropped.
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.finish_one();
    }
}

fn consume(
    mut receiver: mpsc::Receiver<LogRecord>,
    handlers: HandlerRegistry,
    shared: Arc<Shared>,
    fallback: LogWriter,
) {
    let _stop = StopOnExit(&shared);

    while let Some(record) = receiver.blocking_recv() {
        let in_flight = InFlight(&shared);
        let mut label = None;
        let pass = panic::catch_unwind(AssertUnwindSafe(|| {
            label = Some(record.name().to_string());
            handlers.dispatch(&record);
        }));

        match pass {
            Ok(()) => {
                shared.delivered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("logchan.events.delivered").increment(1);
                drop(in_flight);
            }
            Err(payload) => {
                shared.panicked.store(true, Ordering::Release);
                // The event's own methods may be what panicked.
                let label = label.unwrap_or_else(|| record.event().type_name().to_string());
                let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                    report_panic(&label, payload.as_ref(), &fallback)
                }));
                drop(in_flight);
                discard_remaining(&mut receiver, &shared);
                break;
            }
        }
    }

    tracing::debug!(logchan.event = "consumer_stopped", "Dispatch consumer stopped");
}

fn report_panic(label: &str, payload: &(dyn Any + Send), fallback: &LogWriter) {
    let message = panic_message(payload);
    metrics::counter!("logchan.handler.panics").increment(1);

    let line = format!(
        "logchan: handler panicked on {} ({}); delivery stopped",
        label, message
    );
    if let Err(e) = fallback.write_line(&line) {
        eprintln!("{line} [fallback sink failed: {e}]");
    }

    tracing::error!(
        logchan.event = "handler_panicked",
        name = %label,
        panic = %message,
        "Handler panicked, log delivery stopped"
    );
}

fn discard_remaining(receiver: &mut mpsc::Receiver<LogRecord>, shared: &Shared) {
    receiver.close();
    while let Ok(record) = receiver.try_recv() {
        drop(record);
        shared.discarded.fetch_add(1, Ordering::Relaxed);
        shared.finish_one();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::HookError, event::LogLevel, metadata::Metadata};
    use std::io::{self, Write};

    struct Named(&'static str);

    impl LogEvent for Named {
        fn name(&self) -> LogName {
            LogName::from_static(self.0)
        }
        fn error(&self) -> Option<&EventError> {
            None
        }
        fn level(&self) -> LogLevel {
            LogLevel::Info
        }
        fn before_send(&mut self, _metadata: &Metadata) -> std::result::Result<(), HookError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn collecting(dispatcher: &Dispatcher) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.register_fn(move |_record, name, _err| {
            sink.lock().unwrap().push(name.to_string());
        });
        seen
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Dispatcher::new(DispatcherConfig::with_capacity(0));
        assert!(matches!(result, Err(LogchanError::Config { .. })));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let seen = collecting(&dispatcher);

        assert_eq!(dispatcher.state(), ConsumerState::NotStarted);
        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.state(), ConsumerState::Running);

        dispatcher.send(Named("once"));
        assert_eq!(
            dispatcher.shutdown(Duration::from_secs(1)).await,
            DrainOutcome::Drained
        );
        assert_eq!(*seen.lock().unwrap(), vec!["once"]);
    }

    #[tokio::test]
    async fn test_state_machine_transitions() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.state(), ConsumerState::Running);

        let outcome = dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(dispatcher.state(), ConsumerState::Stopped);

        dispatcher.start().unwrap();
        assert_eq!(dispatcher.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_close_before_start_drains_after_start() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let seen = collecting(&dispatcher);

        dispatcher.send(Named("buffered"));
        dispatcher.close();
        assert_eq!(dispatcher.state(), ConsumerState::Draining);
        dispatcher.send(Named("rejected"));

        dispatcher.start().unwrap();
        assert_eq!(
            dispatcher.shutdown(Duration::from_secs(1)).await,
            DrainOutcome::Drained
        );
        assert_eq!(*seen.lock().unwrap(), vec!["buffered"]);
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_send_after_close_is_dropped() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.start().unwrap();
        dispatcher.close();
        assert!(dispatcher.is_closed());

        dispatcher.send(Named("late"));

        let stats = dispatcher.stats();
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_drain_without_consumer_times_out() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.send(Named("waiting"));

        let outcome = dispatcher.drain(Duration::from_millis(50)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut);
        assert_eq!(dispatcher.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_drain_keeps_queue_open() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let seen = collecting(&dispatcher);
        dispatcher.start().unwrap();

        dispatcher.send(Named("first"));
        assert_eq!(
            dispatcher.drain(Duration::from_secs(1)).await,
            DrainOutcome::Drained
        );
        dispatcher.send(Named("second"));
        assert_eq!(
            dispatcher.drain(Duration::from_secs(1)).await,
            DrainOutcome::Drained
        );

        assert!(!dispatcher.is_closed());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_panic_reported_to_fallback_sink() {
        let buffer = Buffer::default();
        let dispatcher = Dispatcher::with_fallback(
            DispatcherConfig::default(),
            LogWriter::new(buffer.clone(), "memory"),
        )
        .unwrap();
        dispatcher.register_fn(|_record, _name, _err| panic!("disk on fire"));
        dispatcher.start().unwrap();

        dispatcher.send(Named("boom"));
        assert_eq!(
            dispatcher.drain(Duration::from_secs(1)).await,
            DrainOutcome::Drained
        );

        let report = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(report.contains("boom"));
        assert!(report.contains("disk on fire"));
    }

    struct UnnamedEvent;

    impl LogEvent for UnnamedEvent {
        fn name(&self) -> LogName {
            panic!("name unavailable")
        }
        fn error(&self) -> Option<&EventError> {
            None
        }
        fn level(&self) -> LogLevel {
            LogLevel::Info
        }
        fn before_send(&mut self, _metadata: &Metadata) -> std::result::Result<(), HookError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_event_name_still_stops_consumer() {
        let buffer = Buffer::default();
        let dispatcher = Dispatcher::with_fallback(
            DispatcherConfig::default(),
            LogWriter::new(buffer.clone(), "memory"),
        )
        .unwrap();
        let seen = collecting(&dispatcher);
        dispatcher.start().unwrap();

        dispatcher.send(UnnamedEvent);
        dispatcher.send(Named("after"));
        assert_eq!(
            dispatcher.shutdown(Duration::from_secs(1)).await,
            DrainOutcome::ConsumerStopped
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.state, ConsumerState::Stopped);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.delivered, 0);
        assert!(seen.lock().unwrap().is_empty());

        let report = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(report.contains("UnnamedEvent"));
        assert!(report.contains("name unavailable"));
    }

    #[test]
    fn test_stats_serialize_with_snake_case_state() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_capacity(1)).unwrap();
        dispatcher.send(Named("kept"));
        dispatcher.send(Named("dropped"));

        let json = serde_json::to_value(dispatcher.stats()).unwrap();
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["dropped"], 1);
        assert_eq!(json["pending"], 1);
        assert_eq!(json["state"], "not_started");
    }

    #[test]
    fn test_panic_message_extraction() {
        let static_payload: Box<dyn Any + Send> = Box::new("static");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other_payload: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
        assert_eq!(panic_message(other_payload.as_ref()), "unknown panic");
    }
}
