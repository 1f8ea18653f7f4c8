//! Immutable parent-linkage tokens passed across thread and process
//! boundaries.

use std::fmt;

/// Identifier shared by every span belonging to one logical trace.
///
/// The backend is responsible for generating these; the lifecycle core only
/// uses them as opaque cache keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id, used by no-op spans.
    pub const INVALID: TraceId = TraceId(0);

    /// Construct a trace id from its raw representation.
    pub const fn from_u128(value: u128) -> Self {
        TraceId(value)
    }

    /// Raw representation of this trace id.
    pub const fn to_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("TraceId({:032x})", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

/// Identifier of a single span within a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id, used by no-op spans.
    pub const INVALID: SpanId = SpanId(0);

    /// Construct a span id from its raw representation.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// Raw representation of this span id.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("SpanId({:016x})", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

/// Immutable carrier of a span's linkage information.
///
/// A `TraceContext` identifies a span so that later work, possibly on another
/// thread or in another process, can continue the same trace as a child of
/// it. It also carries the trace's sampling decision, which descendants
/// inherit instead of re-sampling.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    sampled: bool,
}

impl TraceContext {
    /// Context of the no-op span: invalid ids, not sampled.
    pub const NONE: TraceContext = TraceContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        sampled: false,
    };

    /// Create a new trace context.
    pub fn new(trace_id: TraceId, span_id: SpanId, sampled: bool) -> Self {
        TraceContext {
            trace_id,
            span_id,
            sampled,
        }
    }

    /// The trace this context belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span this context refers to.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Whether the trace this context belongs to was sampled at its root.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Whether both ids are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_ids_make_invalid_context() {
        assert!(!TraceContext::NONE.is_valid());
        assert!(!TraceContext::new(TraceId::INVALID, SpanId::from_u64(1), true).is_valid());
        assert!(!TraceContext::new(TraceId::from_u128(1), SpanId::INVALID, true).is_valid());
        assert!(TraceContext::new(TraceId::from_u128(1), SpanId::from_u64(1), false).is_valid());
    }

    #[test]
    fn ids_render_as_fixed_width_hex() {
        assert_eq!(
            TraceId::from_u128(42).to_string(),
            "0000000000000000000000000000002a"
        );
        assert_eq!(SpanId::from_u64(42).to_string(), "000000000000002a");
    }

    #[test]
    fn context_round_trips_raw_ids() {
        let cx = TraceContext::new(TraceId::from_u128(7), SpanId::from_u64(9), true);
        assert_eq!(cx.trace_id().to_u128(), 7);
        assert_eq!(cx.span_id().to_u64(), 9);
        assert!(cx.is_sampled());
    }
}
