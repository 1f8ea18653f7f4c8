//! No-op backend implementation.
//!
//! Useful when instrumented code should run with tracing fully disabled, and
//! for tests that only exercise lifecycle bookkeeping.

use crate::backend::{Backend, SpanRecorder};
use crate::context::TraceContext;
use crate::error::TraceResult;

/// A [`Backend`] whose spans record nothing and go nowhere.
#[derive(Clone, Debug, Default)]
pub struct NoopBackend {
    _private: (),
}

impl NoopBackend {
    /// Create a new no-op backend.
    pub fn new() -> Self {
        NoopBackend { _private: () }
    }
}

impl Backend for NoopBackend {
    fn start_span(
        &self,
        _name: &str,
        _parent: Option<&TraceContext>,
        _sampled: bool,
    ) -> TraceResult<Box<dyn SpanRecorder>> {
        Ok(Box::new(NoopSpanRecorder { _private: () }))
    }
}

/// Span produced by [`NoopBackend`]: invalid context, ignores everything.
#[derive(Debug, Default)]
pub struct NoopSpanRecorder {
    _private: (),
}

impl SpanRecorder for NoopSpanRecorder {
    fn set_tag(&mut self, _key: &str, _value: &str) {
        // Ignored
    }

    fn tag(&self, _key: &str) -> Option<String> {
        None
    }

    fn trace_context(&self) -> TraceContext {
        TraceContext::NONE
    }

    fn finish(&mut self) -> TraceResult<()> {
        Ok(())
    }
}
