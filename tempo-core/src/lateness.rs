//! Decides what happens to an arriving event given the watermark before its arrival and the
//! configured [DisorderPolicy]. An event is late when its start time is below
//! `cutoff = prior_watermark - lag`.
//!
//! Whether a diagnostic is reported depends only on the start time being late. For intervals under
//! the Adjust policy, whether the event is kept additionally depends on the end time: an interval
//! that ends before the cutoff would be empty after adjustment and is dropped from the output, but it
//! is still reported as adjusted.

use crate::config::DisorderPolicy;
use crate::message::{RawEvent, Timestamp};

/// Outcome of the lateness check for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// On time, forwarded unmodified.
    Accept,
    /// Late under the Drop policy.
    Drop,
    /// Late under the Adjust policy. `keep` is false for an interval whose end is also late.
    Adjust {
        cutoff: Timestamp,
        delta: i64,
        keep: bool,
    },
    /// Late under the Throw policy.
    Fatal { cutoff: Timestamp },
}

impl Verdict {
    /// Whether the decision is reported on the diagnostic channel.
    pub(crate) fn is_reported(&self) -> bool {
        matches!(self, Verdict::Drop | Verdict::Adjust { .. })
    }

    /// Shift reported with the diagnostic, `None` for a drop.
    pub(crate) fn time_adjustment(&self) -> Option<i64> {
        match self {
            Verdict::Adjust { delta, .. } => Some(*delta),
            _ => None,
        }
    }

    /// Produces the event to buffer, if any. Adjusted events get their start moved to the cutoff,
    /// end time and payload are untouched.
    pub(crate) fn apply<T>(self, event: RawEvent<T>) -> Option<RawEvent<T>> {
        match self {
            Verdict::Accept => Some(event),
            Verdict::Adjust {
                cutoff, keep: true, ..
            } => Some(RawEvent {
                start_time: cutoff,
                ..event
            }),
            Verdict::Adjust { keep: false, .. } | Verdict::Drop | Verdict::Fatal { .. } => None,
        }
    }
}

/// Evaluates the event against the watermark observed before it arrived.
pub(crate) fn evaluate<T>(
    event: &RawEvent<T>,
    prior_watermark: Timestamp,
    policy: &DisorderPolicy,
) -> Verdict {
    let cutoff = policy.cutoff(prior_watermark);
    if event.start_time >= cutoff {
        return Verdict::Accept;
    }

    match policy {
        DisorderPolicy::Drop(_) => Verdict::Drop,
        DisorderPolicy::Throw(_) => Verdict::Fatal { cutoff },
        DisorderPolicy::Adjust(_) => {
            let end_late = event.end_time.is_some_and(|end| end < cutoff);
            Verdict::Adjust {
                cutoff,
                delta: cutoff.saturating_sub(event.start_time),
                keep: !end_late,
            }
        }
    }
}
