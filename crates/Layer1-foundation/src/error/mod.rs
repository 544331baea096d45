//! Error types for Errand
//!
//! Every fallible operation in the workspace reports through [`Error`].

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errand error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Submission
    // ========================================================================
    #[error("Task already submitted: {0}")]
    AlreadySubmitted(String),

    #[error("Task {id} is not pending (status: {status})")]
    NotPending { id: String, status: String },

    #[error("Executor closed")]
    ExecutorClosed,

    // ========================================================================
    // Lookup
    // ========================================================================
    #[error("No such task: {0}")]
    NotFound(String),

    // ========================================================================
    // Await
    // ========================================================================
    #[error("Task {0} was never dispatched")]
    NotDispatched(String),

    #[error("Await interrupted: {0}")]
    AwaitInterrupted(String),

    #[error("Task cancelled: {0}")]
    AwaitCancelled(String),

    #[error("Task {id} failed: {cause}")]
    AwaitExecutionFailed {
        id: String,
        #[source]
        cause: TaskFailure,
    },

    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // External
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Raised synchronously at a submission or lookup call site
    pub fn is_submission_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadySubmitted(_)
                | Error::NotPending { .. }
                | Error::NotFound(_)
                | Error::ExecutorClosed
        )
    }

    /// Raised by one of the await-style calls
    pub fn is_await_error(&self) -> bool {
        matches!(
            self,
            Error::NotDispatched(_)
                | Error::AwaitInterrupted(_)
                | Error::AwaitCancelled(_)
                | Error::AwaitExecutionFailed { .. }
        )
    }

    /// The recorded task failure, if this is an execution failure
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            Error::AwaitExecutionFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    pub fn execution_failed(id: impl fmt::Display, cause: TaskFailure) -> Self {
        Error::AwaitExecutionFailed {
            id: id.to_string(),
            cause,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

// ============================================================================
// TaskFailure
// ============================================================================

/// The cause recorded when a task body fails.
///
/// Cheap to clone; the original error is shared, never copied, so a caller
/// can still `downcast_ref` to the concrete type the body returned.
#[derive(Clone)]
pub struct TaskFailure {
    inner: Arc<anyhow::Error>,
    panic: bool,
}

impl TaskFailure {
    pub fn new(error: anyhow::Error) -> Self {
        Self {
            inner: Arc::new(error),
            panic: false,
        }
    }

    /// Failure recorded for a body that panicked instead of returning
    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(anyhow::Error::msg(message.into())),
            panic: true,
        }
    }

    pub fn is_panic(&self) -> bool {
        self.panic
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for TaskFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panic {
            write!(f, "panicked: {}", self.inner)
        } else {
            write!(f, "{:#}", self.inner)
        }
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("error", &self.inner)
            .field("panic", &self.panic)
            .finish()
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}
