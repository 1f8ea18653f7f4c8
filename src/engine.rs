//! Span lifecycle engine.
//!
//! All public tracing entry points live here. The engine decides whether a
//! root trace is recorded, tracks each trace's stack of active spans across
//! threads, correlates spans with caller objects for callback-driven flows,
//! and wraps caller work with the completion combinator matching its
//! execution style so that every opened span closes exactly once.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::correlation::CorrelationCache;
use crate::cache::stack::SpanStackCache;
use crate::combinators::{self, FinishGuard, FinishOnComplete, Promise};
use crate::config::Config;
use crate::context::{TraceContext, TraceId};
use crate::current;
use crate::noop::NoopBackend;
use crate::sampler::Sampler;
use crate::span::SpanHandle;

struct EngineInner {
    backend: Arc<dyn Backend>,
    sampler: Sampler,
    stacks: SpanStackCache,
    correlations: CorrelationCache,
}

/// The lifecycle-tracking core of the instrumentation layer.
///
/// An engine is explicitly constructed and injected; there is no process-wide
/// singleton. Cloning is cheap and clones share all state, so handing a clone
/// to each component that traces is the expected usage.
///
/// Operations come in two symmetric families: the `trace_root_*` family
/// starts a new trace (one sampling coin flip per trace, made here), and the
/// `trace_child_*` family adds a span to an existing trace, inheriting the
/// root's sampling decision. Each family has synchronous, future-style and
/// promise-style variants, plus the callback-correlated
/// [`open_correlated`]/[`close_correlated`] pair for spans whose completion
/// signal is an external event. When sampling excludes a trace, the same API
/// silently hands out no-op spans, so callers never branch.
///
/// [`open_correlated`]: LifecycleEngine::open_correlated
/// [`close_correlated`]: LifecycleEngine::close_correlated
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trace_lifecycle::testing::RecordingBackend;
/// use trace_lifecycle::{Config, LifecycleEngine};
///
/// let backend = RecordingBackend::new();
/// let engine = LifecycleEngine::new(Arc::new(backend.clone()), Config::default());
///
/// engine.trace_root("checkout", || {
///     let cx = engine.current_context().expect("sampled root is active");
///     engine.trace_child("payment", Some(&cx), || {
///         // traced work
///     });
/// });
///
/// assert_eq!(backend.finished_spans().len(), 2);
/// ```
#[derive(Clone)]
pub struct LifecycleEngine {
    inner: Arc<EngineInner>,
}

impl LifecycleEngine {
    /// Create an engine over `backend` with the given configuration.
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        LifecycleEngine {
            inner: Arc::new(EngineInner {
                backend,
                sampler: Sampler::new(config.sampling_rate),
                stacks: SpanStackCache::new(config.cache_ttl, config.cache_max_entries),
                correlations: CorrelationCache::new(config.cache_ttl, config.cache_max_entries),
            }),
        }
    }

    /// An engine that records nothing: no-op backend, sampling off.
    pub fn disabled() -> Self {
        LifecycleEngine::new(
            Arc::new(NoopBackend::new()),
            Config::default().with_sampling_rate(0.0),
        )
    }

    // === new-trace family ===

    /// Trace `f` as the root of a new trace.
    ///
    /// The span closes when `f` returns or unwinds; the result or panic
    /// propagates unchanged.
    pub fn trace_root<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let span = self.root_span(name);
        self.run_traced(span, false, f)
    }

    /// Trace the future produced by `f` as the root of a new trace.
    ///
    /// The span closes when the returned future first resolves, successfully
    /// or not. `f` itself runs immediately with the root span active.
    pub fn trace_root_future<F, Fut>(&self, name: &str, f: F) -> FinishOnComplete<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let span = self.root_span(name);
        self.wrap_future(span, false, f)
    }

    /// Trace the promise produced by `f` as the root of a new trace.
    ///
    /// Span closure is registered on both completion paths of the promise;
    /// the same handle is returned.
    pub fn trace_root_promise<P, F>(&self, name: &str, f: F) -> P
    where
        P: Promise,
        F: FnOnce() -> P,
    {
        let span = self.root_span(name);
        self.wrap_promise(span, false, f)
    }

    // === process-continuation family ===

    /// Trace `f` as this process's root span, continuing the trace described
    /// by `context` when one is supplied.
    ///
    /// With a context, the sampling decision is inherited from it; without
    /// one this behaves like [`trace_root`]. Either way the trace's span
    /// stack is (re)initialized for this process.
    ///
    /// [`trace_root`]: LifecycleEngine::trace_root
    pub fn trace_process<R>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        f: impl FnOnce() -> R,
    ) -> R {
        let span = self.process_span(name, context);
        self.run_traced(span, false, f)
    }

    /// Future-style variant of [`trace_process`].
    ///
    /// [`trace_process`]: LifecycleEngine::trace_process
    pub fn trace_process_future<F, Fut>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        f: F,
    ) -> FinishOnComplete<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let span = self.process_span(name, context);
        self.wrap_future(span, false, f)
    }

    /// Promise-style variant of [`trace_process`].
    ///
    /// [`trace_process`]: LifecycleEngine::trace_process
    pub fn trace_process_promise<P, F>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        f: F,
    ) -> P
    where
        P: Promise,
        F: FnOnce() -> P,
    {
        let span = self.process_span(name, context);
        self.wrap_promise(span, false, f)
    }

    // === add-to-trace family ===

    /// Trace `f` as a child span of `context`, or of the current thread's
    /// active span when no context is supplied.
    ///
    /// If the ancestor was not sampled (or there is no ancestor), `f` runs
    /// under a no-op span: no backend call, no cache writes.
    pub fn trace_child<R>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        f: impl FnOnce() -> R,
    ) -> R {
        let span = self.child_span(name, context);
        self.run_traced(span, true, f)
    }

    /// Future-style variant of [`trace_child`].
    ///
    /// [`trace_child`]: LifecycleEngine::trace_child
    pub fn trace_child_future<F, Fut>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        f: F,
    ) -> FinishOnComplete<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let span = self.child_span(name, context);
        self.wrap_future(span, true, f)
    }

    /// Promise-style variant of [`trace_child`].
    ///
    /// [`trace_child`]: LifecycleEngine::trace_child
    pub fn trace_child_promise<P, F>(&self, name: &str, context: Option<&TraceContext>, f: F) -> P
    where
        P: Promise,
        F: FnOnce() -> P,
    {
        let span = self.child_span(name, context);
        self.wrap_promise(span, true, f)
    }

    // === callback-correlated family ===

    /// Open a child span that stays open after `f` returns, correlated with
    /// the object behind `key` so that [`close_correlated`] can find it
    /// later, from any thread.
    ///
    /// The parent is `context`, or the current thread's active span when no
    /// context is supplied. Only sampled spans are registered; the cache
    /// holds the key weakly and never extends the object's lifetime.
    ///
    /// [`close_correlated`]: LifecycleEngine::close_correlated
    pub fn open_correlated<K, R>(
        &self,
        name: &str,
        context: Option<&TraceContext>,
        key: &Arc<K>,
        f: impl FnOnce() -> R,
    ) -> R
    where
        K: Any + Send + Sync,
    {
        let span = self.child_span(name, context);
        if is_tracked(&span) {
            self.inner.correlations.associate(key, span);
        }
        f()
    }

    /// Close the span correlated with the object behind `key` and remove its
    /// stack entry.
    ///
    /// A miss (never associated, already closed, or expired from the cache)
    /// is a silent no-op, so calling this twice is safe.
    pub fn close_correlated<K>(&self, key: &Arc<K>)
    where
        K: Any + Send + Sync,
    {
        match self.inner.correlations.lookup(key) {
            Some(span) => {
                self.inner.correlations.remove(key);
                self.finish_span(&span, true);
            }
            None => debug!("no span correlated with object, ignoring close"),
        }
    }

    // === introspection ===

    /// Whether the current thread is executing under an active, sampled span.
    pub fn is_trace_active(&self) -> bool {
        current::current_span().is_some()
    }

    /// Linkage token of the current thread's active span, if any.
    pub fn current_context(&self) -> Option<TraceContext> {
        current::current_span().map(|span| span.context().clone())
    }

    /// Linkage token of the span correlated with the object behind `key`.
    pub fn context_for<K>(&self, key: &Arc<K>) -> Option<TraceContext>
    where
        K: Any + Send + Sync,
    {
        self.inner
            .correlations
            .lookup(key)
            .map(|span| span.context().clone())
    }

    /// Number of span frames currently tracked for `trace_id`, or `None`
    /// once the trace's entry has expired or been evicted.
    pub fn active_span_count(&self, trace_id: TraceId) -> Option<usize> {
        self.inner.stacks.depth(trace_id)
    }

    // === span construction ===

    fn root_span(&self, name: &str) -> SpanHandle {
        if !self.inner.sampler.should_sample() {
            return SpanHandle::noop();
        }
        let span = self.start_backend_span(name, None);
        self.track_new_trace(&span);
        span
    }

    fn process_span(&self, name: &str, context: Option<&TraceContext>) -> SpanHandle {
        let sampled = match context {
            Some(context) => context.is_sampled(),
            None => self.inner.sampler.should_sample(),
        };
        if !sampled {
            return SpanHandle::noop();
        }
        let span = self.start_backend_span(name, context);
        self.track_new_trace(&span);
        span
    }

    fn child_span(&self, name: &str, context: Option<&TraceContext>) -> SpanHandle {
        let parent = context
            .cloned()
            .or_else(|| current::current_span().map(|span| span.context().clone()));
        match parent {
            Some(parent) if parent.is_sampled() => {
                let span = self.start_backend_span(name, Some(&parent));
                if is_tracked(&span) {
                    self.inner.stacks.record_active(&span);
                }
                span
            }
            _ => SpanHandle::noop(),
        }
    }

    fn start_backend_span(&self, name: &str, parent: Option<&TraceContext>) -> SpanHandle {
        match self.inner.backend.start_span(name, parent, true) {
            Ok(recorder) => SpanHandle::new(recorder),
            Err(err) => {
                warn!(name, error = %err, "backend failed to start span, degrading to no-op");
                SpanHandle::noop()
            }
        }
    }

    fn track_new_trace(&self, span: &SpanHandle) {
        if !is_tracked(span) {
            return;
        }
        let trace_id = span.context().trace_id();
        self.inner.stacks.ensure_trace(trace_id);
        self.inner.stacks.record_active(span);
    }

    // === completion plumbing ===

    fn run_traced<R>(&self, span: SpanHandle, remove_stack_entry: bool, f: impl FnOnce() -> R) -> R {
        // Guards drop in reverse order: the span is finished first, then the
        // thread's previous active span is restored.
        let _activation = is_tracked(&span).then(|| current::activate(span.clone()));
        let _finish = FinishGuard::new(self.clone(), span, remove_stack_entry);
        f()
    }

    fn wrap_future<F, Fut>(
        &self,
        span: SpanHandle,
        remove_stack_entry: bool,
        f: F,
    ) -> FinishOnComplete<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let inner = {
            let _activation = is_tracked(&span).then(|| current::activate(span.clone()));
            f()
        };
        FinishOnComplete::new(self.clone(), span, remove_stack_entry, inner)
    }

    fn wrap_promise<P, F>(&self, span: SpanHandle, remove_stack_entry: bool, f: F) -> P
    where
        P: Promise,
        F: FnOnce() -> P,
    {
        let promise = {
            let _activation = is_tracked(&span).then(|| current::activate(span.clone()));
            f()
        };
        combinators::finish_on_settle(self, promise, span, remove_stack_entry)
    }

    /// Finish `span` and, for child semantics, drop its stack frame.
    ///
    /// Root frames stay in the stack cache until the whole trace entry is
    /// evicted by TTL or capacity.
    pub(crate) fn finish_span(&self, span: &SpanHandle, remove_stack_entry: bool) {
        span.finish();
        if remove_stack_entry && span.context().is_valid() {
            self.inner.stacks.remove(span);
        }
    }
}

/// Real, cache-tracked span: it has a recorder and a valid context. A noop
/// handle fails the context check, and so does a span from a backend that
/// hands out invalid ids.
fn is_tracked(span: &SpanHandle) -> bool {
    span.is_recording() && span.context().is_valid()
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("sampling_rate", &self.inner.sampler.rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    fn engine_with(backend: &RecordingBackend, rate: f64) -> LifecycleEngine {
        LifecycleEngine::new(
            Arc::new(backend.clone()),
            Config::default().with_sampling_rate(rate),
        )
    }

    #[test]
    fn nested_sync_spans_link_parent_to_child() {
        let backend = RecordingBackend::new();
        let engine = engine_with(&backend, 1.0);

        engine.trace_root("parent", || {
            assert!(engine.is_trace_active());
            let parent_cx = engine.current_context().unwrap();
            engine.trace_child("inner", None, || {
                let child_cx = engine.current_context().unwrap();
                assert_eq!(child_cx.trace_id(), parent_cx.trace_id());
                assert_ne!(child_cx.span_id(), parent_cx.span_id());
            });
            // child deactivated, parent restored
            assert_eq!(engine.current_context().unwrap(), parent_cx);
        });
        assert!(!engine.is_trace_active());

        let finished = backend.finished_spans();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].name, "inner");
        assert_eq!(
            finished[0].parent.as_ref().map(|p| p.span_id()),
            Some(finished[1].context.span_id())
        );
    }

    #[test]
    fn child_without_ancestor_is_noop() {
        let backend = RecordingBackend::new();
        let engine = engine_with(&backend, 1.0);

        engine.trace_child("orphan", None, || {
            assert!(!engine.is_trace_active());
        });
        assert_eq!(backend.started_count(), 0);
    }

    #[test]
    fn unsampled_context_yields_noop_child() {
        let backend = RecordingBackend::new();
        let engine = engine_with(&backend, 1.0);
        let unsampled = TraceContext::new(
            crate::TraceId::from_u128(5),
            crate::SpanId::from_u64(5),
            false,
        );

        engine.trace_child("skipped", Some(&unsampled), || {});
        assert_eq!(backend.started_count(), 0);
    }

    #[test]
    fn process_span_continues_remote_trace() {
        let backend = RecordingBackend::new();
        let engine = engine_with(&backend, 0.0); // local coin flip must not matter
        let remote = TraceContext::new(
            crate::TraceId::from_u128(99),
            crate::SpanId::from_u64(7),
            true,
        );

        engine.trace_process("ingest", Some(&remote), || {
            let cx = engine.current_context().unwrap();
            assert_eq!(cx.trace_id(), remote.trace_id());
            assert!(cx.is_sampled());
        });
        assert_eq!(backend.finished_spans().len(), 1);
        assert_eq!(
            engine.active_span_count(remote.trace_id()),
            Some(1),
            "root frame persists until eviction"
        );
    }

    #[test]
    fn backend_start_failure_does_not_abort_caller() {
        let engine = LifecycleEngine::new(
            Arc::new(crate::testing::FailingBackend),
            Config::default().with_sampling_rate(1.0),
        );
        let result = engine.trace_root("doomed", || {
            assert!(!engine.is_trace_active());
            21 * 2
        });
        assert_eq!(result, 42);
    }

    #[test]
    fn disabled_engine_is_fully_inert() {
        let engine = LifecycleEngine::disabled();
        engine.trace_root("nothing", || {
            assert!(!engine.is_trace_active());
            assert!(engine.current_context().is_none());
        });
    }
}
