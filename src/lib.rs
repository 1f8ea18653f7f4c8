//! Span lifecycle tracking for distributed-tracing instrumentation.
//!
//! This crate is the lifecycle core of a tracing layer: it decides which
//! executions get traced, tracks which span is currently active for each
//! trace as execution hops across threads or resumes through asynchronous
//! completion handles, and guarantees that every opened span is closed
//! exactly once regardless of success, failure, or abandonment.
//!
//! It deliberately does *not* encode, store, or ship trace data. Span
//! creation and transmission belong to a [`Backend`] implementation the
//! engine consumes; this crate owns sampling, activation, cross-thread
//! bookkeeping, and safe completion.
//!
//! # Getting started
//!
//! ```
//! use std::sync::Arc;
//! use trace_lifecycle::testing::RecordingBackend;
//! use trace_lifecycle::{Config, LifecycleEngine};
//!
//! let backend = RecordingBackend::new();
//! let engine = LifecycleEngine::new(
//!     Arc::new(backend.clone()),
//!     Config::default().with_sampling_rate(1.0),
//! );
//!
//! let total = engine.trace_root("checkout", || {
//!     let cx = engine.current_context().expect("root is active");
//!     engine.trace_child("payment", Some(&cx), || 42)
//! });
//!
//! assert_eq!(total, 42);
//! assert_eq!(backend.finished_spans().len(), 2);
//! ```
//!
//! # Execution styles
//!
//! Every operation family comes in three variants matching how the traced
//! work completes:
//!
//! * synchronous ([`LifecycleEngine::trace_root`]) — the span closes when
//!   the call returns or unwinds;
//! * future-style ([`LifecycleEngine::trace_root_future`]) — the span closes
//!   when the returned future first resolves;
//! * promise-style ([`LifecycleEngine::trace_root_promise`]) — closure is
//!   registered on both callback paths of a [`Promise`].
//!
//! Work whose completion signal is an external event instead uses
//! [`LifecycleEngine::open_correlated`] with a caller-chosen key object and
//! [`LifecycleEngine::close_correlated`] once the event arrives.

#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
mod cache;
mod combinators;
pub mod config;
mod context;
mod current;
mod engine;
mod error;
pub mod noop;
mod sampler;
mod span;
pub mod testing;

pub use backend::{Backend, SpanRecorder};
pub use combinators::{FinishOnComplete, Promise};
pub use config::Config;
pub use context::{SpanId, TraceContext, TraceId};
pub use engine::LifecycleEngine;
pub use error::{TraceError, TraceResult};
pub use sampler::Sampler;
pub use span::{SpanHandle, TAG_SAMPLED, TAG_THREAD_ID};
