pub mod machine;
pub mod policy;
pub mod service;

pub use machine::{transition, InvalidTransition};
pub use policy::{ConfirmationPolicy, DeadlinePolicy};
pub use service::{ConfirmationService, Expiry};

use backfill_core::{CoreError, RenderError, RepoError};
use backfill_domain::{ConfirmationState, DomainError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("No confirmation request for booking {0}")]
    RequestNotFound(Uuid),

    #[error("This appointment slot is no longer held")]
    ConfirmationTooLate { booking_id: Uuid },

    #[error("Deadline {deadline} already passed for booking {booking_id}")]
    DeadlineAlreadyPassed { booking_id: Uuid, deadline: DateTime<Utc> },

    #[error("Confirmation for booking {booking_id} already resolved as {state}")]
    AlreadyResolved { booking_id: Uuid, state: ConfirmationState },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl From<ConfirmationError> for CoreError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::BookingNotFound(_) | ConfirmationError::RequestNotFound(_) => {
                CoreError::NotFound(err.to_string())
            }
            ConfirmationError::ConfirmationTooLate { .. } | ConfirmationError::DeadlineAlreadyPassed { .. } => {
                CoreError::DeadlineAlreadyPassedError(err.to_string())
            }
            ConfirmationError::AlreadyResolved { .. }
            | ConfirmationError::Conflict(_)
            | ConfirmationError::Transition(_) => CoreError::ConflictError(err.to_string()),
            ConfirmationError::Domain(e) => e.into(),
            ConfirmationError::Render(e) => CoreError::ValidationError(e.to_string()),
            ConfirmationError::Repository(e) => CoreError::Repository(e),
        }
    }
}
