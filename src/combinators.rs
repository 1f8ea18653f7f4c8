//! Safe-completion combinators.
//!
//! Each execution style gets one wrapper that guarantees the span closes
//! exactly once when the work completes, whatever the outcome: a drop guard
//! for synchronous calls, a wrapper future for future-style handles, and
//! callback registration for promise-style handles. "Root" semantics leave
//! the trace's stack entry in place for eviction; "child" semantics remove
//! the span's frame on close.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use pin_project_lite::pin_project;

use crate::current;
use crate::engine::LifecycleEngine;
use crate::span::SpanHandle;

/// Closes the wrapped span when dropped, on return and on unwind alike.
pub(crate) struct FinishGuard {
    engine: LifecycleEngine,
    span: SpanHandle,
    remove_stack_entry: bool,
}

impl FinishGuard {
    pub(crate) fn new(engine: LifecycleEngine, span: SpanHandle, remove_stack_entry: bool) -> Self {
        FinishGuard {
            engine,
            span,
            remove_stack_entry,
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.engine.finish_span(&self.span, self.remove_stack_entry);
    }
}

pin_project! {
    /// A future that closes its span when the inner future first resolves.
    ///
    /// While polled, the span is the current thread's active span, so spans
    /// started from within the future become its children. Completion, not
    /// success, triggers closure: an `Err` output closes the span the same
    /// way and is handed to the caller untouched.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct FinishOnComplete<F> {
        #[pin]
        inner: F,
        span: Option<SpanHandle>,
        engine: LifecycleEngine,
        remove_stack_entry: bool,
    }
}

impl<F> FinishOnComplete<F> {
    pub(crate) fn new(
        engine: LifecycleEngine,
        span: SpanHandle,
        remove_stack_entry: bool,
        inner: F,
    ) -> Self {
        FinishOnComplete {
            inner,
            span: Some(span),
            engine,
            remove_stack_entry,
        }
    }

    /// Linkage token of the wrapped span while it is still open.
    pub fn context(&self) -> Option<&crate::TraceContext> {
        self.span.as_ref().map(|span| span.context())
    }
}

impl<F> std::fmt::Debug for FinishOnComplete<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishOnComplete")
            .field("span", &self.span)
            .finish()
    }
}

impl<F: Future> Future for FinishOnComplete<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this
            .span
            .as_ref()
            .filter(|span| span.is_recording() && span.context().is_valid())
            .map(|span| current::activate(span.clone()));

        let poll = this.inner.poll(task_cx);
        if poll.is_ready() {
            if let Some(span) = this.span.take() {
                this.engine.finish_span(&span, *this.remove_stack_entry);
            }
        }
        poll
    }
}

/// A one-shot handle that signals completion through registered callbacks
/// rather than through a return value.
///
/// Exactly one of the two callbacks is expected to fire per completion;
/// the lifecycle combinator stays safe even if an implementation fires
/// both, because span closure is take-based.
pub trait Promise: Sized {
    /// Value produced on successful completion.
    type Value;
    /// Error produced on failed completion.
    type Error;

    /// Register a callback for successful completion, returning the same
    /// handle.
    fn on_complete<F>(self, callback: F) -> Self
    where
        F: FnOnce(&Self::Value) + Send + 'static;

    /// Register a callback for failed completion, returning the same handle.
    fn on_error<F>(self, callback: F) -> Self
    where
        F: FnOnce(&Self::Error) + Send + 'static;
}

/// Register span closure on both completion paths of `promise`.
pub(crate) fn finish_on_settle<P: Promise>(
    engine: &LifecycleEngine,
    promise: P,
    span: SpanHandle,
    remove_stack_entry: bool,
) -> P {
    let on_complete = {
        let engine = engine.clone();
        let span = span.clone();
        move |_: &P::Value| engine.finish_span(&span, remove_stack_entry)
    };
    let on_error = {
        let engine = engine.clone();
        move |_: &P::Error| engine.finish_span(&span, remove_stack_entry)
    };
    promise.on_complete(on_complete).on_error(on_error)
}
