use crate::{Engine, EngineError};
use backfill_core::TimerTask;
use backfill_domain::{NotificationRequest, WaitlistEntry};
use backfill_notify::SendError;
use chrono::{DateTime, Utc};
use tracing::{debug, error};
use uuid::Uuid;

/// Run one fired timer. Failures are logged; the queue keeps draining.
pub async fn handle(engine: &Engine, task: TimerTask) {
    let label = task.label();
    debug!(task = label, "Timer fired");
    let result = match task {
        TimerTask::OpenConfirmationWindow { booking_id } => engine.open_window(booking_id).await,
        TimerTask::ConfirmationDeadline { booking_id, deadline } => {
            engine.expire(booking_id, deadline).await.map(|_| ())
        }
        TimerTask::OfferResponseDeadline { entry_id, deadline } => {
            engine.offer_timed_out(entry_id, deadline).await.map(|_| ())
        }
        TimerTask::NotificationRetry(request) => engine.retry_notification(*request).await,
    };
    if let Err(e) = result {
        error!(task = label, error = %e, "Timer handler failed");
    }
}

impl Engine {
    async fn open_window(&self, booking_id: Uuid) -> Result<(), EngineError> {
        if let Some(request) = self.confirmations.on_window_opened(booking_id).await? {
            self.metrics.confirmation_entered(&request.state.to_string());
            self.report_confirmation_failure(&request);
        }
        Ok(())
    }

    async fn offer_timed_out(
        &self,
        entry_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<WaitlistEntry>, EngineError> {
        match self.matcher.on_offer_timeout(entry_id, deadline).await? {
            Some(outcome) => self.apply_outcome(outcome).await,
            None => Ok(None),
        }
    }

    async fn retry_notification(&self, request: NotificationRequest) -> Result<(), EngineError> {
        let channel = request.target.channel.to_string();
        match self.dispatcher.resend(&request).await {
            Ok(_) | Err(SendError::RetryScheduled { .. }) => Ok(()),
            Err(SendError::Permanent(cause)) => {
                self.publish_notification_failure(request.owner, channel, request.attempt, cause.to_string());
                Ok(())
            }
            Err(SendError::Exhausted { attempts, cause }) => {
                self.publish_notification_failure(request.owner, channel, attempts, cause.to_string());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
