use thiserror::Error;

/// Describe the result of operations against the tracing backend.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing backend.
///
/// These never surface through the lifecycle entry points; the engine logs
/// them and degrades to no-op spans so that caller work always proceeds.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The backend failed to create or finish a span.
    #[error("span backend failed: {0}")]
    Backend(String),

    /// Other errors propagated from backend implementations.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Backend(err_msg)
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Backend(err_msg.into())
    }
}
