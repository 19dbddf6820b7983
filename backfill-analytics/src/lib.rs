pub mod aggregator;
pub mod reliability;
pub mod summary;

pub use aggregator::{AnalyticsAggregator, NotificationCosts};
pub use summary::DashboardSummary;

use backfill_core::{CoreError, RepoError};

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl From<AnalyticsError> for CoreError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Validation(msg) => CoreError::ValidationError(msg),
            AnalyticsError::Repository(e) => CoreError::Repository(e),
        }
    }
}
