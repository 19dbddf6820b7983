use crate::backoff::DeliveryPolicy;
use crate::SendError;
use backfill_core::repository::{
    ConfirmationRepository, NotificationAttemptRepository, RepoResult, WaitlistRepository,
};
use backfill_core::{ChannelProvider, Clock, ProviderError, TimerScheduler, TimerTask};
use backfill_domain::{
    AttemptResult, ConfirmationRequest, ConfirmationState, DeliveryReceipt, DeliveryStatus,
    NotificationAttempt, NotificationOwner, NotificationRequest, WaitlistEntry,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Owner records are re-read and written back with compare-and-set; give up
/// after this many lost races rather than spin.
const OWNER_UPDATE_RETRIES: usize = 5;

/// Sends one message per call. Never loops: retries go back through the scheduler.
pub struct NotificationDispatcher {
    provider: Arc<dyn ChannelProvider>,
    attempts: Arc<dyn NotificationAttemptRepository>,
    confirmations: Arc<dyn ConfirmationRepository>,
    waitlist: Arc<dyn WaitlistRepository>,
    scheduler: Arc<dyn TimerScheduler>,
    clock: Arc<dyn Clock>,
    policy: DeliveryPolicy,
}

enum OwnerUpdate<'a> {
    Delivered { result: AttemptResult, at: DateTime<Utc> },
    Retrying { attempt: u32, cause: &'a ProviderError },
    Failed { attempt: u32, cause: &'a ProviderError },
}

impl NotificationDispatcher {
    pub fn new(
        provider: Arc<dyn ChannelProvider>,
        attempts: Arc<dyn NotificationAttemptRepository>,
        confirmations: Arc<dyn ConfirmationRepository>,
        waitlist: Arc<dyn WaitlistRepository>,
        scheduler: Arc<dyn TimerScheduler>,
        clock: Arc<dyn Clock>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            provider,
            attempts,
            confirmations,
            waitlist,
            scheduler,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Timer entry point for a scheduled retry. The owner is re-read first;
    /// `Ok(None)` means the question was answered, withdrawn or replaced in the
    /// meantime and nothing was sent.
    pub async fn resend(&self, request: &NotificationRequest) -> Result<Option<DeliveryReceipt>, SendError> {
        if !self.still_wanted(request).await? {
            tracing::debug!(
                owner = request.owner.kind(),
                owner_id = %request.owner.id(),
                attempt = request.attempt,
                "Owner moved on, retry dropped"
            );
            return Ok(None);
        }
        self.send(request).await.map(Some)
    }

    pub async fn send(&self, request: &NotificationRequest) -> Result<DeliveryReceipt, SendError> {
        // 1. Validate
        if request.target.address.is_blank() {
            return Err(SendError::Validation("target address is empty".to_string()));
        }
        if request.body.trim().is_empty() {
            return Err(SendError::Validation("message body is empty".to_string()));
        }
        let max_attempts = self.policy.max_attempts_for(request.priority);
        if request.attempt == 0 || request.attempt > max_attempts {
            return Err(SendError::Validation(format!(
                "attempt {} outside 1..={}",
                request.attempt, max_attempts
            )));
        }

        // 2. One provider call, bounded by the send timeout
        let scheduled_for = request.retry_at.unwrap_or_else(|| self.clock.now());
        let outcome = match tokio::time::timeout(
            self.policy.send_timeout,
            self.provider.send_message(
                request.target.address.expose(),
                request.target.channel,
                &request.body,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };
        let now = self.clock.now();

        // 3. Record the attempt
        let result = match &outcome {
            Ok(receipt) if receipt.delivered => AttemptResult::Delivered,
            Ok(_) => AttemptResult::Sent,
            Err(ProviderError::HardBounce(_)) => AttemptResult::Bounced,
            Err(_) => AttemptResult::Failed,
        };
        let attempt = NotificationAttempt {
            id: Uuid::new_v4(),
            salon_id: request.salon_id,
            owner: request.owner,
            target: request.target.address.clone(),
            channel: request.target.channel,
            payload_ref: request.id,
            attempt: request.attempt,
            result,
            error_detail: outcome.as_ref().err().map(|e| e.to_string()),
            scheduled_for,
            created_at: now,
        };
        self.attempts.append(&attempt).await?;

        // 4. Decide what happens next
        match outcome {
            Ok(receipt) => {
                tracing::info!(
                    owner = request.owner.kind(),
                    owner_id = %request.owner.id(),
                    to = %request.target.address.hint(),
                    attempt = request.attempt,
                    message_id = %receipt.message_id,
                    "Notification sent"
                );
                self.update_owner(request.owner, OwnerUpdate::Delivered { result, at: now })
                    .await?;
                Ok(DeliveryReceipt {
                    attempt_id: attempt.id,
                    provider_message_id: receipt.message_id,
                    channel: request.target.channel,
                    attempt: request.attempt,
                    result,
                    sent_at: now,
                })
            }
            Err(cause) if cause.is_transient() && request.attempt < max_attempts => {
                let retry_at = now + self.policy.backoff.delay_after(request.attempt);
                tracing::warn!(
                    owner = request.owner.kind(),
                    owner_id = %request.owner.id(),
                    attempt = request.attempt,
                    %retry_at,
                    error = %cause,
                    "Transient delivery failure, retry scheduled"
                );
                self.scheduler.schedule(
                    retry_at,
                    TimerTask::NotificationRetry(Box::new(request.next_attempt(retry_at))),
                );
                self.update_owner(
                    request.owner,
                    OwnerUpdate::Retrying {
                        attempt: request.attempt,
                        cause: &cause,
                    },
                )
                .await?;
                Err(SendError::RetryScheduled {
                    attempt: request.attempt,
                    retry_at,
                    cause,
                })
            }
            Err(cause) => {
                let transient = cause.is_transient();
                tracing::error!(
                    owner = request.owner.kind(),
                    owner_id = %request.owner.id(),
                    to = %request.target.address.hint(),
                    attempt = request.attempt,
                    error = %cause,
                    "Notification permanently failed"
                );
                self.update_owner(
                    request.owner,
                    OwnerUpdate::Failed {
                        attempt: request.attempt,
                        cause: &cause,
                    },
                )
                .await?;
                if transient {
                    Err(SendError::Exhausted {
                        attempts: request.attempt,
                        cause,
                    })
                } else {
                    Err(SendError::Permanent(cause))
                }
            }
        }
    }

    async fn still_wanted(&self, request: &NotificationRequest) -> RepoResult<bool> {
        if request.reply_by.is_some_and(|deadline| self.clock.now() >= deadline) {
            return Ok(false);
        }
        match request.owner {
            NotificationOwner::Confirmation { booking_id } => {
                Ok(self.confirmations.get_by_booking(booking_id).await?.is_some_and(|current| {
                    current.state == ConfirmationState::AwaitingConfirmation
                        && same_deadline(request.reply_by, current.expires_at)
                }))
            }
            NotificationOwner::WaitlistOffer { entry_id } => {
                Ok(self.waitlist.get(entry_id).await?.is_some_and(|current| {
                    current.has_open_offer() && same_deadline(request.reply_by, current.match_deadline)
                }))
            }
            NotificationOwner::Courtesy { .. } => Ok(true),
        }
    }

    async fn update_owner(&self, owner: NotificationOwner, update: OwnerUpdate<'_>) -> RepoResult<()> {
        match owner {
            NotificationOwner::Confirmation { booking_id } => {
                for _ in 0..OWNER_UPDATE_RETRIES {
                    let Some(mut request) = self.confirmations.get_by_booking(booking_id).await? else {
                        return Ok(());
                    };
                    apply_to_confirmation(&mut request, &update);
                    let expected = request.state;
                    if self.confirmations.compare_and_set(&request, expected).await?.is_some() {
                        return Ok(());
                    }
                }
                tracing::warn!(%booking_id, "Gave up recording delivery status after repeated conflicts");
                Ok(())
            }
            NotificationOwner::WaitlistOffer { entry_id } => {
                for _ in 0..OWNER_UPDATE_RETRIES {
                    let Some(mut entry) = self.waitlist.get(entry_id).await? else {
                        return Ok(());
                    };
                    if !apply_to_entry(&mut entry, &update) {
                        return Ok(());
                    }
                    let expected = entry.status;
                    if self.waitlist.compare_and_set(&entry, expected).await?.is_some() {
                        return Ok(());
                    }
                }
                tracing::warn!(%entry_id, "Gave up recording delivery status after repeated conflicts");
                Ok(())
            }
            NotificationOwner::Courtesy { .. } => Ok(()),
        }
    }
}

fn apply_to_confirmation(request: &mut ConfirmationRequest, update: &OwnerUpdate<'_>) {
    match update {
        OwnerUpdate::Delivered { result, at } => {
            request.delivery_status = if *result == AttemptResult::Delivered {
                DeliveryStatus::Delivered
            } else {
                DeliveryStatus::Sent
            };
            request.sent_at.get_or_insert(*at);
            request.last_error = None;
        }
        OwnerUpdate::Retrying { attempt, cause } => {
            request.delivery_status = DeliveryStatus::Retrying;
            request.retry_count = *attempt;
            request.last_error = Some(cause.to_string());
        }
        OwnerUpdate::Failed { attempt, cause } => {
            request.delivery_status = DeliveryStatus::Failed;
            request.retry_count = attempt.saturating_sub(1);
            request.permanently_failed = true;
            request.last_error = Some(cause.to_string());
        }
    }
}

/// A message without a deadline belongs to whatever question is open.
fn same_deadline(asked: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    match asked {
        Some(asked) => current == Some(asked),
        None => true,
    }
}

/// Returns `false` when there is nothing to write.
fn apply_to_entry(entry: &mut WaitlistEntry, update: &OwnerUpdate<'_>) -> bool {
    match update {
        OwnerUpdate::Failed { .. } => {
            entry.notification_failed = true;
            true
        }
        OwnerUpdate::Delivered { .. } if entry.notification_failed => {
            entry.notification_failed = false;
            true
        }
        _ => false,
    }
}
