//! Watermark estimation from noisy per-record arrival timestamps.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// The value reported until enough samples arrive: -1 ms from the epoch.
pub(crate) fn unset_watermark() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(-1).expect("-1 ms is a representable timestamp")
}

/// Sliding-window watermark estimator.
///
/// Arrival timestamps are not ordered, delivery jitter reorders them. The
/// estimate is the minimum over a trailing window of `min_samples`
/// timestamps, clamped so a previously reported value is never regressed
/// below. Downstream time-windowed consumers rely on the output being
/// non-decreasing.
pub(crate) struct WatermarkEstimator {
    samples: VecDeque<DateTime<Utc>>,
    min_samples: usize,
    last_emitted: DateTime<Utc>,
}

impl WatermarkEstimator {
    pub(crate) fn new(min_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(min_samples),
            min_samples,
            last_emitted: unset_watermark(),
        }
    }

    /// Record the arrival timestamp of a consumed record. The window holds
    /// the last `min_samples` observations; older ones fall off.
    pub(crate) fn observe(&mut self, arrival_time: DateTime<Utc>) {
        if self.samples.len() >= self.min_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(arrival_time);
    }

    /// Current watermark. Stays at the unset sentinel until `min_samples`
    /// observations have been made, then reports the window minimum,
    /// clamped to never go backwards.
    pub(crate) fn current(&mut self) -> DateTime<Utc> {
        if self.samples.len() >= self.min_samples {
            if let Some(candidate) = self.samples.iter().min().copied() {
                if candidate > self.last_emitted {
                    self.last_emitted = candidate;
                }
            }
        }
        self.last_emitted
    }
}
