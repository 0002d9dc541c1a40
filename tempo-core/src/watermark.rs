use crate::message::Timestamp;

/// Tracks the high-water mark, the largest raw start time seen so far. It is always advanced with
/// the original arrival time, whatever the lateness decision for the event turns out to be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct WatermarkTracker {
    high_water_mark: Timestamp,
}

impl WatermarkTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Moves the watermark up to `raw_start` (never down) and returns the watermark as it was
    /// before this event.
    pub(crate) fn advance(&mut self, raw_start: Timestamp) -> Timestamp {
        let prior = self.high_water_mark;
        self.high_water_mark = prior.max(raw_start);
        prior
    }

    pub(crate) fn current(&self) -> Timestamp {
        self.high_water_mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_returns_prior() {
        let mut tracker = WatermarkTracker::new();
        assert_eq!(tracker.current(), 0);

        assert_eq!(tracker.advance(12), 0);
        assert_eq!(tracker.advance(8), 12);
        assert_eq!(tracker.current(), 12);
        assert_eq!(tracker.advance(15), 12);
        assert_eq!(tracker.current(), 15);
    }

    #[test]
    fn test_negative_times_do_not_move_initial_watermark() {
        let mut tracker = WatermarkTracker::new();
        assert_eq!(tracker.advance(-40), 0);
        assert_eq!(tracker.current(), 0);
    }
}
