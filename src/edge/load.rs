// Edge Load Tracking

use crate::config::LoadConfig;
use crate::types::EdgeId;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Share of the score reached at the soft threshold
const SOFT_SCORE: f64 = 0.25;

/// Maximum extra processing delay at full load, seconds
const MAX_LOAD_DELAY_SECS: f64 = 3.0;

/// Upper bound of the random processing noise at full load, seconds
const LOAD_NOISE_SECS: f64 = 0.05;

/// Tracks in-flight requests of one edge and turns them into a load score
#[derive(Debug)]
pub struct LoadTracker {
    /// Requests currently being handled
    active: AtomicUsize,
    /// Requests at which the score reaches 0.25
    soft_threshold: usize,
    /// Requests at which the score saturates
    saturation: usize,
}

impl LoadTracker {
    /// Creates a new tracker
    pub fn new(config: &LoadConfig) -> Self {
        Self {
            active: AtomicUsize::new(0),
            soft_threshold: config.soft_threshold,
            saturation: config.saturation,
        }
    }

    /// Marks a request as started; the returned guard ends it when dropped
    pub fn begin_request(&self) -> RequestGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        RequestGuard { tracker: self }
    }

    fn end_request(&self) {
        // Never wraps below zero even if a guard is somehow dropped twice
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Gets the number of in-flight requests
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Gets the current load score in [0, 1]
    pub fn score(&self) -> f64 {
        self.score_for(self.active_requests())
    }

    /// Load score for a given number of in-flight requests.
    ///
    /// Rises linearly to 0.25 at the soft threshold, then linearly to 1.0 at
    /// the saturation point, and stays there.
    pub fn score_for(&self, active: usize) -> f64 {
        let score = if active <= self.soft_threshold {
            if self.soft_threshold == 0 {
                0.0
            } else {
                SOFT_SCORE * active as f64 / self.soft_threshold as f64
            }
        } else {
            let span = self.saturation.saturating_sub(self.soft_threshold);
            if span == 0 {
                1.0
            } else {
                let over = (active - self.soft_threshold).min(span);
                SOFT_SCORE + (1.0 - SOFT_SCORE) * over as f64 / span as f64
            }
        };
        score.clamp(0.0, 1.0)
    }

    /// Takes a timestamped sample for broadcasting
    pub fn sample(&self, edge_id: EdgeId) -> LoadSample {
        let active = self.active_requests();
        LoadSample {
            edge_id,
            load: self.score_for(active),
            active_requests: active,
            timestamp: Utc::now(),
        }
    }

    /// Extra processing time caused by overload.
    ///
    /// Zero up to the soft threshold. Beyond it the delay grows with the
    /// fourth power of the overload fraction, so a saturated edge adds
    /// seconds while a mildly busy one is barely slowed.
    pub fn load_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let active = self.active_requests();
        if active <= self.soft_threshold {
            return Duration::ZERO;
        }

        let span = self.saturation.saturating_sub(self.soft_threshold);
        let factor = if span == 0 {
            1.0
        } else {
            ((active - self.soft_threshold) as f64 / span as f64).min(1.0)
        };
        let noise: f64 = rng.gen_range(0.0..LOAD_NOISE_SECS);
        Duration::from_secs_f64(MAX_LOAD_DELAY_SECS * factor.powi(4) + noise * factor)
    }
}

/// Ends a request on drop, on every exit path of the handler
#[derive(Debug)]
pub struct RequestGuard<'a> {
    tracker: &'a LoadTracker,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end_request();
    }
}

/// Load report sent between edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    /// Reporting edge
    pub edge_id: EdgeId,
    /// Load score in [0, 1]
    pub load: f64,
    /// In-flight requests when sampled
    pub active_requests: usize,
    /// Sampling time
    pub timestamp: DateTime<Utc>,
}

impl LoadSample {
    /// Gets the sample age at `now`; samples from the future are age zero
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Checks whether the sample is too old to route on
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) > window
    }
}
