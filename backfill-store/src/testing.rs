//! Doubles for exercising the engine without a network or a wall clock.

use async_trait::async_trait;
use backfill_core::{ChannelProvider, Clock, ProviderError, ProviderReceipt, TimerScheduler, TimerTask};
use backfill_domain::Channel;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
    }
}

/// One message the provider was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub address: String,
    pub channel: Channel,
    pub body: String,
}

/// Provider that plays back queued outcomes, then succeeds once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderReceipt, ProviderError>>>,
    sent: Mutex<Vec<SentMessage>>,
    counter: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = Result<ProviderReceipt, ProviderError>>) -> Self {
        let provider = Self::default();
        provider
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
        provider
    }

    /// Every call fails with the same error.
    pub fn failing(error: ProviderError, times: usize) -> Self {
        Self::with_script(std::iter::repeat(Err(error)).take(times))
    }

    pub fn push(&self, outcome: Result<ProviderReceipt, ProviderError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelProvider for ScriptedProvider {
    async fn send_message(
        &self,
        address: &str,
        channel: Channel,
        body: &str,
    ) -> Result<ProviderReceipt, ProviderError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                address: address.to_string(),
                channel,
                body: body.to_string(),
            });
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| {
            Ok(ProviderReceipt {
                message_id: format!("scripted-{}", n),
                delivered: false,
            })
        })
    }
}

/// Provider that never answers within any sane timeout.
#[derive(Debug, Clone, Copy)]
pub struct StalledProvider {
    pub delay: std::time::Duration,
}

#[async_trait]
impl ChannelProvider for StalledProvider {
    async fn send_message(&self, _: &str, _: Channel, _: &str) -> Result<ProviderReceipt, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(ProviderReceipt {
            message_id: "late".to_string(),
            delivered: false,
        })
    }
}

/// Scheduler that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(DateTime<Utc>, TimerTask)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<(DateTime<Utc>, TimerTask)> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove and return every recorded task due at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<TimerTask> {
        let mut scheduled = self.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
        let (due, later): (Vec<_>, Vec<_>) = scheduled.drain(..).partition(|(at, _)| *at <= now);
        *scheduled = later;
        due.into_iter().map(|(_, task)| task).collect()
    }
}

impl TimerScheduler for RecordingScheduler {
    fn schedule(&self, at: DateTime<Utc>, task: TimerTask) {
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((at, task));
    }
}
