//! Producer-side enrichment of outgoing events

use crate::{
    config::DispatcherConfig,
    metadata::{Metadata, ThreadSeq},
    session::session_id,
    stack::{StackSnapshot, MIN_STACK_DEPTH},
};
use chrono::Local;

/// Builds the [`Metadata`] for an event on the thread that sends it.
///
/// Runs synchronously so the captured stack reflects the real call site. Never
/// fails and never blocks on the dispatch queue.
#[derive(Debug, Clone, Copy)]
pub struct Enricher {
    skip_frames: usize,
    stack_depth: usize,
}

impl Enricher {
    pub fn new(skip_frames: usize, stack_depth: usize) -> Self {
        Self {
            skip_frames,
            stack_depth: stack_depth.max(MIN_STACK_DEPTH),
        }
    }

    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::new(config.skip_frames, config.stack_depth)
    }

    #[inline(never)]
    pub fn enrich(&self) -> Metadata {
        Metadata::new(
            ThreadSeq::current(),
            session_id(),
            StackSnapshot::capture(self.skip_frames, self.stack_depth),
            Local::now(),
        )
    }

    pub fn skip_frames(&self) -> usize {
        self.skip_frames
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(0, MIN_STACK_DEPTH)
    }
}
