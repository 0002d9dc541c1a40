//! Events flowing through the ingress pipeline. A [RawEvent] is what arrives (in arrival order, with
//! its original timestamps), an [OutputEvent] is what leaves (in sync-time order), and a [Diagnostic]
//! reports what happened to an event that arrived too late.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Logical time of an event ("sync time").
pub type Timestamp = i64;

/// Sync time of the terminal punctuation, nothing can follow it.
pub const INFINITY: Timestamp = Timestamp::MAX;

/// Event as delivered by the upstream, timestamps are never modified on a [RawEvent].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent<T> {
    pub start_time: Timestamp,
    /// Present for interval events, absent for start-edge (point) events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    pub payload: T,
}

impl<T> RawEvent<T> {
    /// Creates a start-edge event.
    pub fn start_edge(start_time: Timestamp, payload: T) -> Self {
        Self {
            start_time,
            end_time: None,
            payload,
        }
    }

    /// Creates an interval event covering `[start_time, end_time)`.
    pub fn interval(start_time: Timestamp, end_time: Timestamp, payload: T) -> Self {
        Self {
            start_time,
            end_time: Some(end_time),
            payload,
        }
    }

    pub fn is_interval(&self) -> bool {
        self.end_time.is_some()
    }

    /// Converts into the output shape, keeping the times as they are.
    pub(crate) fn into_output(self) -> OutputEvent<T> {
        match self.end_time {
            Some(end_time) => OutputEvent::Interval {
                start_time: self.start_time,
                end_time,
                payload: self.payload,
            },
            None => OutputEvent::StartEdge {
                start_time: self.start_time,
                payload: self.payload,
            },
        }
    }
}

/// Event emitted by the pipeline, ordered by [OutputEvent::sync_time].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutputEvent<T> {
    StartEdge {
        start_time: Timestamp,
        payload: T,
    },
    Interval {
        start_time: Timestamp,
        end_time: Timestamp,
        payload: T,
    },
    /// Progress marker: no data below `sync_time` follows it.
    Punctuation { sync_time: Timestamp },
}

impl<T> OutputEvent<T> {
    /// The time the event is ordered by downstream.
    pub fn sync_time(&self) -> Timestamp {
        match self {
            OutputEvent::StartEdge { start_time, .. } => *start_time,
            OutputEvent::Interval { start_time, .. } => *start_time,
            OutputEvent::Punctuation { sync_time } => *sync_time,
        }
    }

    pub fn is_punctuation(&self) -> bool {
        matches!(self, OutputEvent::Punctuation { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            OutputEvent::StartEdge { payload, .. } | OutputEvent::Interval { payload, .. } => {
                Some(payload)
            }
            OutputEvent::Punctuation { .. } => None,
        }
    }
}

impl<T> fmt::Display for OutputEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputEvent::StartEdge { start_time, .. } => write!(f, "StartEdge({start_time})"),
            OutputEvent::Interval {
                start_time,
                end_time,
                ..
            } => write!(f, "Interval({start_time}, {end_time})"),
            OutputEvent::Punctuation { sync_time } if *sync_time == INFINITY => {
                write!(f, "Punctuation(Infinity)")
            }
            OutputEvent::Punctuation { sync_time } => write!(f, "Punctuation({sync_time})"),
        }
    }
}

/// Report of a dropped or time-shifted event. The event carries its original times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic<T> {
    pub event: RawEvent<T>,
    /// `None` when the event was dropped, `Some(cutoff - start_time)` when it was adjusted.
    pub time_adjustment: Option<i64>,
}

impl<T> Diagnostic<T> {
    pub fn is_drop(&self) -> bool {
        self.time_adjustment.is_none()
    }
}

type Selector<T> = Arc<dyn Fn(&T) -> Timestamp + Send + Sync>;

/// Derives event times from a domain payload. Without an end selector every payload becomes a
/// start-edge event.
#[derive(Clone)]
pub struct TimeSelector<T> {
    start: Selector<T>,
    end: Option<Selector<T>>,
}

impl<T> TimeSelector<T> {
    pub fn new(start: impl Fn(&T) -> Timestamp + Send + Sync + 'static) -> Self {
        Self {
            start: Arc::new(start),
            end: None,
        }
    }

    pub fn with_end(mut self, end: impl Fn(&T) -> Timestamp + Send + Sync + 'static) -> Self {
        self.end = Some(Arc::new(end));
        self
    }

    pub fn select(&self, payload: T) -> RawEvent<T> {
        let start_time = (self.start)(&payload);
        let end_time = self.end.as_ref().map(|end| end(&payload));
        RawEvent {
            start_time,
            end_time,
            payload,
        }
    }
}

impl<T> fmt::Debug for TimeSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeSelector {{ interval: {} }}", self.end.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_output_keeps_shape() {
        let point = RawEvent::start_edge(3, "a").into_output();
        assert_eq!(
            point,
            OutputEvent::StartEdge {
                start_time: 3,
                payload: "a"
            }
        );

        let interval = RawEvent::interval(3, 9, "b").into_output();
        assert_eq!(interval.sync_time(), 3);
        assert!(matches!(interval, OutputEvent::Interval { end_time: 9, .. }));
    }

    #[test]
    fn test_raw_event_from_json() {
        let point: RawEvent<String> =
            serde_json::from_str(r#"{"startTime": 12, "payload": "x"}"#).unwrap();
        assert_eq!(point, RawEvent::start_edge(12, "x".to_string()));

        let interval: RawEvent<u32> =
            serde_json::from_str(r#"{"startTime": 1, "endTime": 4, "payload": 7}"#).unwrap();
        assert!(interval.is_interval());
        assert_eq!(interval.end_time, Some(4));
    }

    #[test]
    fn test_output_event_json() {
        let punct: OutputEvent<u32> = OutputEvent::Punctuation { sync_time: 20 };
        assert_eq!(
            serde_json::to_string(&punct).unwrap(),
            r#"{"kind":"punctuation","syncTime":20}"#
        );

        let interval = OutputEvent::Interval {
            start_time: 1,
            end_time: 2,
            payload: 5u32,
        };
        assert_eq!(
            serde_json::to_string(&interval).unwrap(),
            r#"{"kind":"interval","startTime":1,"endTime":2,"payload":5}"#
        );
        assert!(interval.payload().is_some());
        assert!(punct.payload().is_none());
    }

    #[test]
    fn test_display() {
        let infinity: OutputEvent<()> = OutputEvent::Punctuation {
            sync_time: INFINITY,
        };
        assert_eq!(infinity.to_string(), "Punctuation(Infinity)");
        assert_eq!(
            OutputEvent::StartEdge {
                start_time: 5,
                payload: ()
            }
            .to_string(),
            "StartEdge(5)"
        );
    }

    #[test]
    fn test_time_selector() {
        #[derive(Debug, Clone, PartialEq)]
        struct Trade {
            opened: i64,
            closed: i64,
        }

        let points = TimeSelector::new(|t: &Trade| t.opened);
        let raw = points.select(Trade {
            opened: 4,
            closed: 8,
        });
        assert_eq!(raw.start_time, 4);
        assert_eq!(raw.end_time, None);

        let intervals = TimeSelector::new(|t: &Trade| t.opened).with_end(|t: &Trade| t.closed);
        let raw = intervals.select(Trade {
            opened: 4,
            closed: 8,
        });
        assert_eq!(raw.end_time, Some(8));
        assert_eq!(raw.payload.closed, 8);
    }
}
