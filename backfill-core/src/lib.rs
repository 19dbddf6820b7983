pub mod channel;
pub mod clock;
pub mod renderer;
pub mod repository;
pub mod schedule;

pub use channel::{ChannelProvider, ProviderError, ProviderReceipt};
pub use clock::{Clock, SystemClock};
pub use renderer::{RenderError, TemplateRenderer};
pub use repository::RepoError;
pub use schedule::{TimerScheduler, TimerTask};

use backfill_domain::DomainError;

/// Error taxonomy shared by every component.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed input. Rejected immediately, never retried.
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Provider timeout or 5xx. Retried with backoff.
    #[error("Transient delivery failure: {0}")]
    TransientDeliveryError(String),

    /// Invalid address or hard bounce. Recorded once, not retried.
    #[error("Permanent delivery failure: {0}")]
    PermanentDeliveryError(String),

    /// Lost a compare-and-set race; the caller re-runs against fresh state.
    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("Deadline already passed: {0}")]
    DeadlineAlreadyPassedError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl From<DomainError> for CoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => CoreError::ValidationError(msg),
            DomainError::InvalidTransition { from, to } => {
                CoreError::ConflictError(format!("cannot move from {} to {}", from, to))
            }
        }
    }
}
