//! Per-trace stacks of currently-active spans.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::ExpiringCache;
use crate::context::TraceId;
use crate::span::SpanHandle;

/// Maps a trace id to the ordered stack of spans currently open for that
/// trace, most-recently-activated on top.
///
/// The stack is what lets one logical trace hop across threads: a new frame
/// is only pushed when the top frame was created on a *different* thread
/// than the one recording, so same-thread continuations reuse the existing
/// frame instead of spuriously nesting. Comparing creator-thread identity is
/// a deliberate heuristic, not a strict correctness guarantee; thread reuse
/// by a scheduler can produce a false "same continuation" match.
///
/// All bookkeeping here is advisory for parent/child linkage quality.
/// Faults are logged and swallowed rather than surfaced to callers.
pub(crate) struct SpanStackCache {
    inner: ExpiringCache<TraceId, Vec<SpanHandle>>,
}

impl SpanStackCache {
    pub(crate) fn new(ttl: Duration, max_entries: usize) -> Self {
        SpanStackCache {
            inner: ExpiringCache::new(ttl, max_entries),
        }
    }

    /// Start tracking a trace. Idempotent: an existing stack is left alone.
    pub(crate) fn ensure_trace(&self, trace_id: TraceId) {
        self.inner.insert_if_absent(trace_id, Vec::new);
    }

    /// Record `span` as the active point of its trace, pushing a frame only
    /// when the top frame belongs to another thread or the stack is empty.
    pub(crate) fn record_active(&self, span: &SpanHandle) {
        let trace_id = span.context().trace_id();
        let current = thread::current().id();
        let recorded = self.inner.with_mut(&trace_id, |stack| {
            match stack.last() {
                Some(top) if top.creator_thread() == current => false,
                _ => {
                    stack.push(span.clone());
                    true
                }
            }
        });
        match recorded {
            Some(pushed) => trace!(%trace_id, pushed, "updated span stack"),
            None => debug!(%trace_id, "trace not tracked, skipping stack update"),
        }
    }

    /// Remove `span` from its trace's stack by identity, wherever it sits.
    ///
    /// Asynchronous completions do not honor stack order, so this must not
    /// assume the span is on top.
    pub(crate) fn remove(&self, span: &SpanHandle) {
        let trace_id = span.context().trace_id();
        self.inner.with_mut(&trace_id, |stack| {
            if let Some(position) = stack.iter().position(|frame| frame.same_span(span)) {
                stack.remove(position);
            }
        });
    }

    /// Number of open frames for a trace, `None` when untracked or expired.
    pub(crate) fn depth(&self, trace_id: TraceId) -> Option<usize> {
        self.inner.get(&trace_id, |stack| stack.len())
    }
}
