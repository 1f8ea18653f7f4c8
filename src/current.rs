//! Per-thread activation state.
//!
//! Each thread keeps a stack of the spans it has activated. Activation is
//! scoped: the guard returned by [`activate`] restores the previous active
//! span when dropped, so the backend-visible "current span" for a thread is
//! only ever mutated by that thread.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::span::SpanHandle;

thread_local! {
    static ACTIVE_SPANS: RefCell<Vec<SpanHandle>> = const { RefCell::new(Vec::new()) };
}

/// Resets the thread's active span to the previous one when dropped.
pub(crate) struct ActivationGuard {
    // relies on thread locals, must not cross threads
    _marker: PhantomData<*const ()>,
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_SPANS.try_with(|spans| spans.borrow_mut().pop());
    }
}

/// Make `span` the current thread's active span for the lifetime of the
/// returned guard.
pub(crate) fn activate(span: SpanHandle) -> ActivationGuard {
    let _ = ACTIVE_SPANS.try_with(|spans| spans.borrow_mut().push(span));
    ActivationGuard {
        _marker: PhantomData,
    }
}

/// Snapshot of the current thread's active span, if any.
pub(crate) fn current_span() -> Option<SpanHandle> {
    ACTIVE_SPANS
        .try_with(|spans| spans.borrow().last().cloned())
        .ok()
        .flatten()
}
