//! Error types for bossbat

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BossbatError>;

/// Failure returned by a job's work function or by a middleware layer.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BossbatError {
    /// The trigger value is neither a duration string, a number, nor a valid cron expression.
    #[error("Unknown interval of type \"{kind}\" passed to hire: {reason}")]
    InvalidTriggerKind { kind: String, reason: String },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// The worker has quit and no longer holds store connections.
    #[error("Worker has quit")]
    Stopped,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BossbatError {
    pub(crate) fn invalid_kind(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTriggerKind {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}
