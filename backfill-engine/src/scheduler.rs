use backfill_core::{TimerScheduler, TimerTask};
use chrono::{DateTime, Utc};
use prometheus::IntGauge;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError};

struct Timer {
    at: DateTime<Utc>,
    seq: u64,
    task: TimerTask,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Timer>>,
    next_seq: u64,
}

/// Every pending timer in one min-heap ordered by (deadline, insertion order).
///
/// Nothing is ever removed early; stale timers fire and their handlers
/// find the entity has moved on.
pub struct DeadlineQueue {
    state: Mutex<QueueState>,
    gauge: Option<IntGauge>,
}

impl DeadlineQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            gauge: None,
        }
    }

    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            gauge: Some(gauge),
        }
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<TimerTask> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut due = Vec::new();
        while state.heap.peek().is_some_and(|Reverse(timer)| timer.at <= now) {
            if let Some(Reverse(timer)) = state.heap.pop() {
                due.push(timer.task);
            }
        }
        self.observe(state.heap.len());
        due
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.heap.peek().map(|Reverse(timer)| timer.at)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn observe(&self, pending: usize) {
        if let Some(gauge) = &self.gauge {
            gauge.set(pending as i64);
        }
    }
}

impl Default for DeadlineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler for DeadlineQueue {
    fn schedule(&self, at: DateTime<Utc>, task: TimerTask) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = state.next_seq;
        state.next_seq += 1;
        tracing::debug!(task = task.label(), %at, "Timer scheduled");
        state.heap.push(Reverse(Timer { at, seq, task }));
        self.observe(state.heap.len());
    }
}
