//! Shared handles to open spans.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::warn;

use crate::backend::SpanRecorder;
use crate::context::TraceContext;

/// Tag recording the root sampling decision, propagated to descendants.
pub const TAG_SAMPLED: &str = "sampled";
/// Tag recording the identity of the thread that created a span.
pub const TAG_THREAD_ID: &str = "thread.id";

struct SpanState {
    context: TraceContext,
    creator: ThreadId,
    /// `None` from birth for no-op spans; taken exactly once on finish.
    recorder: Mutex<Option<Box<dyn SpanRecorder>>>,
}

/// A cheaply clonable handle to a span tracked by the lifecycle engine.
///
/// Real and no-op spans share this one type; the difference is whether the
/// recorder slot was ever occupied. Finishing takes the recorder out of its
/// slot, which makes a second finish a structural no-op rather than a backend
/// error.
#[derive(Clone)]
pub struct SpanHandle {
    state: Arc<SpanState>,
}

impl SpanHandle {
    /// Wrap a backend span, tagging it with the sampling decision and the
    /// creating thread's identity.
    pub(crate) fn new(mut recorder: Box<dyn SpanRecorder>) -> Self {
        let creator = thread::current().id();
        recorder.set_tag(TAG_SAMPLED, "true");
        recorder.set_tag(TAG_THREAD_ID, &format!("{creator:?}"));
        let context = recorder.trace_context();
        SpanHandle {
            state: Arc::new(SpanState {
                context,
                creator,
                recorder: Mutex::new(Some(recorder)),
            }),
        }
    }

    /// The no-op span returned when sampling excludes a trace or the backend
    /// fails. Performs no tracking and satisfies the same surface.
    pub(crate) fn noop() -> Self {
        SpanHandle {
            state: Arc::new(SpanState {
                context: TraceContext::NONE,
                creator: thread::current().id(),
                recorder: Mutex::new(None),
            }),
        }
    }

    /// Linkage token of this span.
    pub fn context(&self) -> &TraceContext {
        &self.state.context
    }

    /// `true` while the span is real and has not yet been finished.
    pub fn is_recording(&self) -> bool {
        self.lock_recorder().is_some()
    }

    /// Thread on which the span was created. Used by the stack cache's
    /// same-continuation heuristic.
    pub(crate) fn creator_thread(&self) -> ThreadId {
        self.state.creator
    }

    /// Identity comparison: two handles for the same underlying span.
    pub fn same_span(&self, other: &SpanHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Record a tag if the span is still open.
    pub fn set_tag(&self, key: &str, value: &str) {
        if let Some(recorder) = self.lock_recorder().as_mut() {
            recorder.set_tag(key, value);
        }
    }

    /// Read a tag from the span if it is still open.
    pub fn tag(&self, key: &str) -> Option<String> {
        self.lock_recorder().as_ref().and_then(|r| r.tag(key))
    }

    /// Finish the span at the backend. Second and later calls find the slot
    /// empty and do nothing. Backend failures are logged and swallowed.
    pub(crate) fn finish(&self) {
        let recorder = self.lock_recorder().take();
        if let Some(mut recorder) = recorder {
            if let Err(err) = recorder.finish() {
                warn!(
                    trace_id = %self.state.context.trace_id(),
                    span_id = %self.state.context.span_id(),
                    error = %err,
                    "backend failed to finish span"
                );
            }
        }
    }

    fn lock_recorder(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn SpanRecorder>>> {
        // A panic under the lock leaves nothing inconsistent behind, so a
        // poisoned lock is still usable.
        self.state
            .recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandle")
            .field("context", &self.state.context)
            .field("recording", &self.is_recording())
            .finish()
    }
}
