use backfill_domain::analytics::round1;
use backfill_domain::{ReliabilityHistory, WaitlistEntry};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// Reliability points before any history is known.
const RELIABILITY_BASE: f64 = 20.0;
const POINTS_PER_COMPLETION: f64 = 4.0;
const POINTS_PER_NO_SHOW: f64 = 10.0;
/// Raw reliability points are out of this many.
const RELIABILITY_SCALE: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub wait: f64,
    pub reliability: f64,
    pub flexibility: f64,
    /// Waiting longer than this earns no extra points
    pub wait_saturation: Duration,
    /// A preferred window at least this wide earns full flexibility points
    pub flexibility_saturation: Duration,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            wait: 40.0,
            reliability: 40.0,
            flexibility: 20.0,
            wait_saturation: Duration::hours(72),
            flexibility_saturation: Duration::hours(48),
        }
    }
}

/// Rule-based priority score for waitlist entries, 0 to 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScorer {
    weights: ScoreWeights,
}

impl PriorityScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, entry: &WaitlistEntry, history: &ReliabilityHistory, now: DateTime<Utc>) -> f64 {
        let total = self.wait_component(entry.created_at, now)
            + self.reliability_component(history)
            + self.flexibility_component(entry.window.width());
        round1(total.clamp(0.0, 100.0))
    }

    /// Linear in time spent waiting, capped at the saturation point
    fn wait_component(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let waited = (now - created_at).num_seconds().max(0) as f64;
        let saturation = self.weights.wait_saturation.num_seconds().max(1) as f64;
        (waited / saturation).min(1.0) * self.weights.wait
    }

    fn reliability_component(&self, history: &ReliabilityHistory) -> f64 {
        let points = RELIABILITY_BASE + POINTS_PER_COMPLETION * f64::from(history.completions)
            - POINTS_PER_NO_SHOW * f64::from(history.no_shows);
        points.clamp(0.0, RELIABILITY_SCALE) / RELIABILITY_SCALE * self.weights.reliability
    }

    fn flexibility_component(&self, width: Duration) -> f64 {
        let width = width.num_seconds().max(0) as f64;
        let saturation = self.weights.flexibility_saturation.num_seconds().max(1) as f64;
        (width / saturation).min(1.0) * self.weights.flexibility
    }
}

/// Best candidate first: highest score, then longest waiting, then lowest id.
pub fn rank(candidates: &mut [WaitlistEntry]) {
    candidates.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(Ordering::Equal)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}
