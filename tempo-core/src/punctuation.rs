use std::num::NonZeroU64;

use crate::config::PunctuationPolicy;
use crate::message::Timestamp;

/// Snaps `t` down to the nearest multiple of `period` (floor, also for negative times).
pub fn snap(t: Timestamp, period: NonZeroU64) -> Timestamp {
    let period = i128::from(period.get());
    let snapped = i128::from(t).div_euclid(period) * period;
    // snapped <= t, so only the lower bound can be crossed
    Timestamp::try_from(snapped).unwrap_or(Timestamp::MIN)
}

/// Emits periodic punctuations from the released stream. A punctuation follows the released entry
/// that moved at least one period past the entry that triggered the previous punctuation, and is
/// snapped to the left period boundary of that entry.
#[derive(Debug, Clone)]
pub(crate) struct PunctuationGenerator {
    period: Option<NonZeroU64>,
    last_punctuation_time: Timestamp,
}

impl PunctuationGenerator {
    pub(crate) fn new(policy: PunctuationPolicy) -> Self {
        let period = match policy {
            PunctuationPolicy::None => None,
            PunctuationPolicy::Periodic(period) => NonZeroU64::new(period),
        };
        Self {
            period,
            last_punctuation_time: 0,
        }
    }

    /// Checks a released key and returns the punctuation's sync time if one is due.
    pub(crate) fn on_release(&mut self, key: Timestamp) -> Option<Timestamp> {
        let period = self.period?;
        let gap = i128::from(key) - i128::from(self.last_punctuation_time);
        if gap < i128::from(period.get()) {
            return None;
        }
        self.last_punctuation_time = key;
        Some(snap(key, period))
    }

    pub(crate) fn last_punctuation_time(&self) -> Timestamp {
        self.last_punctuation_time
    }
}
