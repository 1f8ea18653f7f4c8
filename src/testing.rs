//! In-memory test doubles.
//!
//! [`RecordingBackend`] stores every started and finished span in memory so
//! tests can assert on lifecycle behavior; [`TestPromise`] is a manually
//! completed promise for exercising the promise-style combinators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, SpanRecorder};
use crate::combinators::Promise;
use crate::context::{SpanId, TraceContext, TraceId};
use crate::error::{TraceError, TraceResult};

/// A finished span as observed by [`RecordingBackend`].
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    /// Span name.
    pub name: String,
    /// The span's own linkage token.
    pub context: TraceContext,
    /// Parent linkage, `None` for roots.
    pub parent: Option<TraceContext>,
    /// Tags recorded on the span.
    pub tags: HashMap<String, String>,
}

#[derive(Default)]
struct RecordingState {
    started: u64,
    finished: Vec<FinishedSpan>,
}

/// Backend that allocates predictable incrementing ids and records finished
/// spans for inspection. Clones share storage.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<RecordingState>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingBackend {
    /// Create an empty recording backend.
    pub fn new() -> Self {
        RecordingBackend {
            state: Arc::new(Mutex::new(RecordingState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Every span finished so far, in completion order.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.state.lock().unwrap().finished.clone()
    }

    /// How many spans were started, finished or not.
    pub fn started_count(&self) -> u64 {
        self.state.lock().unwrap().started
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBackend").finish()
    }
}

impl Backend for RecordingBackend {
    fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
        sampled: bool,
    ) -> TraceResult<Box<dyn SpanRecorder>> {
        let trace_id = match parent {
            Some(parent) => parent.trace_id(),
            None => TraceId::from_u128(self.next() as u128),
        };
        let context = TraceContext::new(trace_id, SpanId::from_u64(self.next()), sampled);
        self.state.lock().unwrap().started += 1;
        Ok(Box::new(RecordingSpan {
            name: name.to_owned(),
            context,
            parent: parent.cloned(),
            tags: HashMap::new(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct RecordingSpan {
    name: String,
    context: TraceContext,
    parent: Option<TraceContext>,
    tags: HashMap<String, String>,
    state: Arc<Mutex<RecordingState>>,
}

impl SpanRecorder for RecordingSpan {
    fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_owned(), value.to_owned());
    }

    fn tag(&self, key: &str) -> Option<String> {
        self.tags.get(key).cloned()
    }

    fn trace_context(&self) -> TraceContext {
        self.context.clone()
    }

    fn finish(&mut self) -> TraceResult<()> {
        self.state.lock().unwrap().finished.push(FinishedSpan {
            name: self.name.clone(),
            context: self.context.clone(),
            parent: self.parent.clone(),
            tags: self.tags.clone(),
        });
        Ok(())
    }
}

/// Backend whose span creation always fails, for exercising degradation
/// paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingBackend;

impl Backend for FailingBackend {
    fn start_span(
        &self,
        _name: &str,
        _parent: Option<&TraceContext>,
        _sampled: bool,
    ) -> TraceResult<Box<dyn SpanRecorder>> {
        Err(TraceError::Backend("backend unavailable".into()))
    }
}

type CompleteCallback<T> = Box<dyn FnOnce(&T) + Send>;

struct PromiseCallbacks<T, E> {
    on_complete: Vec<CompleteCallback<T>>,
    on_error: Vec<CompleteCallback<E>>,
}

/// A promise completed by hand from test code.
///
/// Mirrors the registration-style completion handles the promise combinator
/// targets: callbacks registered with [`Promise::on_complete`] run when
/// [`complete`] is called, error callbacks when [`fail`] is called.
///
/// [`complete`]: TestPromise::complete
/// [`fail`]: TestPromise::fail
pub struct TestPromise<T, E> {
    callbacks: Arc<Mutex<PromiseCallbacks<T, E>>>,
}

impl<T, E> std::fmt::Debug for TestPromise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPromise").finish()
    }
}

impl<T, E> Clone for TestPromise<T, E> {
    fn clone(&self) -> Self {
        TestPromise {
            callbacks: Arc::clone(&self.callbacks),
        }
    }
}

impl<T, E> Default for TestPromise<T, E> {
    fn default() -> Self {
        TestPromise::new()
    }
}

impl<T, E> TestPromise<T, E> {
    /// Create an unsettled promise.
    pub fn new() -> Self {
        TestPromise {
            callbacks: Arc::new(Mutex::new(PromiseCallbacks {
                on_complete: Vec::new(),
                on_error: Vec::new(),
            })),
        }
    }

    /// Settle successfully, running all registered completion callbacks.
    pub fn complete(&self, value: T) {
        let callbacks = std::mem::take(&mut self.callbacks.lock().unwrap().on_complete);
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Settle with an error, running all registered error callbacks.
    pub fn fail(&self, error: E) {
        let callbacks = std::mem::take(&mut self.callbacks.lock().unwrap().on_error);
        for callback in callbacks {
            callback(&error);
        }
    }
}

impl<T, E> Promise for TestPromise<T, E> {
    type Value = T;
    type Error = E;

    fn on_complete<F>(self, callback: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.callbacks
            .lock()
            .unwrap()
            .on_complete
            .push(Box::new(callback));
        self
    }

    fn on_error<F>(self, callback: F) -> Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.callbacks
            .lock()
            .unwrap()
            .on_error
            .push(Box::new(callback));
        self
    }
}
