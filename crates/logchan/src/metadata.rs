//! Call-site metadata attached to every event before it is queued

use crate::{session::SessionId, stack::StackSnapshot};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

static NEXT_THREAD_SEQ: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_SEQ: u64 = NEXT_THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique number assigned to a thread the first time it asks for one.
///
/// `ThreadSeq(0)` is never handed out and marks metadata that was not enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct ThreadSeq(u64);

impl ThreadSeq {
    /// Sequence number of the calling thread
    pub fn current() -> Self {
        Self(THREAD_SEQ.with(|seq| *seq))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values captured on the producer thread at the moment an event is sent
#[derive(Debug, Clone)]
pub struct Metadata {
    thread_id: ThreadSeq,
    session_id: SessionId,
    frames: StackSnapshot,
    timestamp: DateTime<Local>,
}

impl Metadata {
    pub fn new(
        thread_id: ThreadSeq,
        session_id: SessionId,
        frames: StackSnapshot,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            thread_id,
            session_id,
            frames,
            timestamp,
        }
    }

    pub fn thread_id(&self) -> ThreadSeq {
        self.thread_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Call stack captured at the send site
    pub fn frames(&self) -> &StackSnapshot {
        &self.frames
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            thread_id: ThreadSeq::default(),
            session_id: SessionId::default(),
            frames: StackSnapshot::empty(),
            timestamp: DateTime::<Local>::from(UNIX_EPOCH),
        }
    }
}
