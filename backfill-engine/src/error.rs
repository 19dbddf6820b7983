use backfill_analytics::AnalyticsError;
use backfill_confirm::ConfirmationError;
use backfill_core::{CoreError, RepoError};
use backfill_domain::DomainError;
use backfill_notify::SendError;
use backfill_waitlist::MatchError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Slot already taken: {0}")]
    SlotTaken(String),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::BookingNotFound(_) => CoreError::NotFound(err.to_string()),
            EngineError::SlotTaken(_) => CoreError::ConflictError(err.to_string()),
            EngineError::Confirmation(e) => e.into(),
            EngineError::Match(e) => e.into(),
            EngineError::Analytics(e) => e.into(),
            EngineError::Send(e) => e.into(),
            EngineError::Domain(e) => e.into(),
            EngineError::Repository(e) => CoreError::Repository(e),
            EngineError::Metrics(e) => CoreError::Repository(RepoError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_late_maps_to_deadline_passed() {
        let err = EngineError::from(ConfirmationError::ConfirmationTooLate {
            booking_id: Uuid::new_v4(),
        });
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::DeadlineAlreadyPassedError(_)));
        assert_eq!(core.to_string(), "Deadline already passed: This appointment slot is no longer held");
    }

    #[test]
    fn test_taken_slot_is_a_conflict() {
        let core: CoreError = EngineError::SlotTaken("chair 1 at 14:00".to_string()).into();
        assert!(matches!(core, CoreError::ConflictError(_)));
    }

    #[test]
    fn test_validation_surfaces_as_validation() {
        let core: CoreError = EngineError::from(DomainError::Validation("bad".to_string())).into();
        assert!(matches!(core, CoreError::ValidationError(_)));
    }
}
