//! Call stack capture at the send site and lazy frame walking
//!
//! Capturing only records instruction pointers. Symbols (file, function, line) are
//! resolved one frame at a time as a [`CallerFrames`] iterator is advanced, so
//! handlers that never look at the stack never pay for symbolication.

use crate::metadata::Metadata;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Smallest window of frames kept for a snapshot
pub const MIN_STACK_DEPTH: usize = 32;

// Room for unwinder and send-path frames that sit above the caller.
const INTERNAL_FRAME_ALLOWANCE: usize = 16;

// Frames belonging to the capture path itself. Matched as exact paths or as a
// path followed by `::` (closures, generic instantiations).
const INTERNAL_FUNCTIONS: &[&str] = &[
    "backtrace",
    "_Unwind_Backtrace",
    "logchan::stack::StackSnapshot::capture",
    "logchan::enricher::Enricher::enrich",
    "logchan::dispatcher::Dispatcher::send",
    "logchan::dispatcher::Dispatcher::send_boxed",
];

/// One resolved stack frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub ip: usize,
}

/// The (file, function, line) triple reported for a call site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallInfo {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl From<&Frame> for CallInfo {
    fn from(frame: &Frame) -> Self {
        Self {
            file: frame.file.clone(),
            function: frame.function.clone(),
            line: frame.line,
        }
    }
}

/// Unresolved call stack recorded on the producer thread
#[derive(Debug, Clone)]
pub struct StackSnapshot {
    ips: Arc<[usize]>,
    skip: usize,
    depth: usize,
}

impl StackSnapshot {
    /// Snapshot with no frames
    pub fn empty() -> Self {
        Self {
            ips: Arc::from(Vec::new()),
            skip: 0,
            depth: MIN_STACK_DEPTH,
        }
    }

    /// Record the calling stack.
    ///
    /// The capture path is excluded from the window, then `skip` more frames, and
    /// at most `depth` frames (never fewer than [`MIN_STACK_DEPTH`]) are kept.
    #[inline(never)]
    pub fn capture(skip: usize, depth: usize) -> Self {
        let depth = depth.max(MIN_STACK_DEPTH);
        let limit = depth + skip + INTERNAL_FRAME_ALLOWANCE;
        let mut ips = Vec::with_capacity(limit);

        backtrace::trace(|frame| {
            ips.push(frame.ip() as usize);
            ips.len() < limit
        });

        Self {
            ips: ips.into(),
            skip,
            depth,
        }
    }

    /// Whether any raw frame was recorded
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    /// Number of raw frames recorded, before filtering
    pub fn raw_len(&self) -> usize {
        self.ips.len()
    }

    /// A fresh single-pass walk over the filtered window
    pub fn frames(&self) -> CallerFrames {
        CallerFrames {
            ips: Arc::clone(&self.ips),
            cursor: 0,
            pending: VecDeque::new(),
            leading: true,
            to_skip: self.skip,
            remaining: self.depth,
        }
    }
}

impl Default for StackSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Lazily resolving iterator over a [`StackSnapshot`] window.
///
/// Single pass: once exhausted it keeps returning `None`.
#[derive(Debug)]
pub struct CallerFrames {
    ips: Arc<[usize]>,
    cursor: usize,
    pending: VecDeque<Frame>,
    leading: bool,
    to_skip: usize,
    remaining: usize,
}

impl Iterator for CallerFrames {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            if self.remaining == 0 {
                return None;
            }

            let frame = match self.pending.pop_front() {
                Some(frame) => frame,
                None => {
                    let ip = *self.ips.get(self.cursor)?;
                    self.cursor += 1;
                    self.pending = resolve_ip(ip);
                    continue;
                }
            };

            if self.leading {
                if is_internal(&frame.function) {
                    continue;
                }
                self.leading = false;
            }

            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }

            self.remaining -= 1;
            return Some(frame);
        }
    }
}

impl FusedIterator for CallerFrames {}

// An address may expand to several symbols when calls were inlined.
fn resolve_ip(ip: usize) -> VecDeque<Frame> {
    let mut frames = VecDeque::new();

    backtrace::resolve(ip as *mut c_void, |symbol| {
        frames.push_back(Frame {
            function: symbol
                .name()
                .map(|name| format!("{name:#}"))
                .unwrap_or_default(),
            file: symbol
                .filename()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
            line: symbol.lineno().unwrap_or(0),
            ip,
        });
    });

    if frames.is_empty() {
        frames.push_back(Frame {
            ip,
            ..Frame::default()
        });
    }

    frames
}

fn is_internal(function: &str) -> bool {
    INTERNAL_FUNCTIONS.iter().any(|prefix| {
        function
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Filter that accepts every frame
pub fn default_frames_filter(_file: &str, _function: &str, _line: u32, _frame: &Frame) -> bool {
    true
}

/// Walk `frames` until `filter` accepts one.
///
/// Returns the accepted frame's triple, or the last frame visited when nothing
/// matched. An empty walk yields an empty [`CallInfo`]. The walk consumes the
/// frames it visits.
pub fn get_call_stack_info_from_frames<I, F>(frames: I, mut filter: F) -> CallInfo
where
    I: IntoIterator<Item = Frame>,
    F: FnMut(&str, &str, u32, &Frame) -> bool,
{
    let mut info = CallInfo::default();

    for frame in frames {
        info = CallInfo::from(&frame);
        if filter(&frame.file, &frame.function, frame.line, &frame) {
            break;
        }
    }

    info
}

/// Call site of an enriched event, using [`default_frames_filter`]
pub fn call_info(metadata: &Metadata) -> CallInfo {
    get_call_stack_info_from_frames(metadata.frames().frames(), default_frames_filter)
}
