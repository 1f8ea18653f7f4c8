//! Capability surface of the underlying tracing backend.
//!
//! The lifecycle core does not own span encoding or transmission. It consumes
//! a backend that can create spans, record string-keyed tags on them, and
//! finish them. Everything else (id formats, wire protocols, exporters) is
//! the backend's business.

use crate::context::TraceContext;
use crate::error::TraceResult;

/// A single span under construction at the backend.
///
/// Implementations are owned by exactly one [`SpanHandle`] and are only ever
/// mutated behind its lock, so they need `Send` but not `Sync`.
///
/// [`SpanHandle`]: crate::SpanHandle
pub trait SpanRecorder: Send {
    /// Record a string-keyed tag on this span.
    fn set_tag(&mut self, key: &str, value: &str);

    /// Read back a previously recorded tag.
    fn tag(&self, key: &str) -> Option<String>;

    /// The linkage token identifying this span.
    fn trace_context(&self) -> TraceContext;

    /// Mark the span as ended and hand it off to the backend.
    ///
    /// The lifecycle engine guarantees this is called at most once.
    fn finish(&mut self) -> TraceResult<()>;
}

/// Factory for backend spans.
pub trait Backend: Send + Sync {
    /// Start a new span.
    ///
    /// With a parent, the new span must join the parent's trace; without one
    /// the backend allocates a fresh trace id. `sampled` is the root-level
    /// sampling decision already made by the engine and must be reflected in
    /// the returned span's context so descendants inherit it.
    fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
        sampled: bool,
    ) -> TraceResult<Box<dyn SpanRecorder>>;
}
