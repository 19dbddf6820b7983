pub mod backoff;
pub mod dispatcher;

pub use backoff::{BackoffPolicy, DeliveryPolicy};
pub use dispatcher::NotificationDispatcher;

use backfill_core::{CoreError, ProviderError, RepoError};
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid notification: {0}")]
    Validation(String),

    #[error("Attempt {attempt} failed ({cause}), retry scheduled for {retry_at}")]
    RetryScheduled {
        attempt: u32,
        retry_at: DateTime<Utc>,
        cause: ProviderError,
    },

    #[error("Permanent delivery failure: {0}")]
    Permanent(ProviderError),

    #[error("Gave up after {attempts} attempts: {cause}")]
    Exhausted { attempts: u32, cause: ProviderError },

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl SendError {
    /// The owner has been flagged and nothing further will be sent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SendError::Permanent(_) | SendError::Exhausted { .. })
    }
}

impl From<SendError> for CoreError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Validation(msg) => CoreError::ValidationError(msg),
            SendError::RetryScheduled { .. } => CoreError::TransientDeliveryError(err.to_string()),
            SendError::Permanent(_) | SendError::Exhausted { .. } => {
                CoreError::PermanentDeliveryError(err.to_string())
            }
            SendError::Repository(e) => CoreError::Repository(e),
        }
    }
}
