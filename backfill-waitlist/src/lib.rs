pub mod matcher;
pub mod scoring;

pub use matcher::{MatchOutcome, WaitlistMatcher};
pub use scoring::{rank, PriorityScorer, ScoreWeights};

use backfill_core::{CoreError, RenderError, RepoError};
use backfill_domain::{DomainError, WaitlistStatus};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Waitlist entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Waitlist entry {entry_id} has no open offer (status {status})")]
    NoOpenOffer { entry_id: Uuid, status: WaitlistStatus },

    #[error("Offer to waitlist entry {entry_id} has expired")]
    OfferExpired { entry_id: Uuid },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl From<MatchError> for CoreError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::EntryNotFound(_) => CoreError::NotFound(err.to_string()),
            MatchError::OfferExpired { .. } => CoreError::DeadlineAlreadyPassedError(err.to_string()),
            MatchError::NoOpenOffer { .. } | MatchError::Conflict(_) => CoreError::ConflictError(err.to_string()),
            MatchError::Domain(e) => e.into(),
            MatchError::Render(e) => CoreError::ValidationError(e.to_string()),
            MatchError::Repository(e) => CoreError::Repository(e),
        }
    }
}
