//! Error types for the event stream and the subscribe server.

use crate::types::Topic;
use thiserror::Error;

/// Boxed error returned by snapshot providers and external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a [`Context`](crate::context::Context) is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error type for publisher and subscription operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The subscription was force-closed by the server. Resubscribe from scratch.
    #[error("subscription closed by server, client must reset state and resubscribe")]
    SubscriptionClosed,

    #[error("event publisher is shut down")]
    PublisherClosed,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("no snapshot handler registered for topic {0}")]
    NoSnapshotHandler(Topic),

    #[error("snapshot for topic {topic} failed: {source}")]
    Snapshot {
        topic: Topic,
        #[source]
        source: BoxError,
    },

    #[error("event index {index} for topic {topic} does not follow last index {last}")]
    IndexRegression { topic: Topic, index: u64, last: u64 },
}

impl StreamError {
    /// True for server-initiated invalidation, as opposed to caller cancellation.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            StreamError::SubscriptionClosed | StreamError::PublisherClosed
        )
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Status code surfaced at the subscribe boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    /// Subscription invalidated server-side; reconnect and resubscribe from the start.
    Aborted,
    PermissionDenied,
    Canceled,
    DeadlineExceeded,
    InvalidArgument,
    Unavailable,
    Internal,
}

/// Error terminating a served subscribe call.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("aborted: {0}")]
    Aborted(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SubscribeError {
    pub fn code(&self) -> Code {
        match self {
            SubscribeError::Aborted(_) => Code::Aborted,
            SubscribeError::PermissionDenied(_) => Code::PermissionDenied,
            SubscribeError::Canceled => Code::Canceled,
            SubscribeError::DeadlineExceeded => Code::DeadlineExceeded,
            SubscribeError::InvalidArgument(_) => Code::InvalidArgument,
            SubscribeError::Unavailable(_) => Code::Unavailable,
            SubscribeError::Internal(_) => Code::Internal,
        }
    }

    /// True when the caller must discard its view and resubscribe.
    pub fn is_reset(&self) -> bool {
        self.code() == Code::Aborted
    }
}

impl From<ContextError> for SubscribeError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Canceled => SubscribeError::Canceled,
            ContextError::DeadlineExceeded => SubscribeError::DeadlineExceeded,
        }
    }
}

impl From<StreamError> for SubscribeError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::SubscriptionClosed | StreamError::PublisherClosed => {
                SubscribeError::Aborted(e.to_string())
            }
            StreamError::Context(ctx) => ctx.into(),
            StreamError::NoSnapshotHandler(_) => SubscribeError::InvalidArgument(e.to_string()),
            StreamError::Snapshot { .. } | StreamError::IndexRegression { .. } => {
                SubscribeError::Internal(e.to_string())
            }
        }
    }
}
