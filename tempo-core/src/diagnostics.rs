use tracing::debug;

use crate::message::{Diagnostic, RawEvent};

/// Secondary output reporting every drop/adjust decision in arrival order. It is not delayed by the
/// reorder buffer: a record is appended in the same `push` that made the decision. When nobody
/// subscribed, records are not built at all.
#[derive(Debug)]
pub(crate) struct DiagnosticsEmitter<T> {
    subscribed: bool,
    records: Vec<Diagnostic<T>>,
}

impl<T: Clone> DiagnosticsEmitter<T> {
    pub(crate) fn new(subscribed: bool) -> Self {
        Self {
            subscribed,
            records: Vec::new(),
        }
    }

    /// Records the decision for `event`, which must carry its original times.
    pub(crate) fn emit(&mut self, event: &RawEvent<T>, time_adjustment: Option<i64>) {
        debug!(
            start_time = event.start_time,
            end_time = ?event.end_time,
            ?time_adjustment,
            "Late arrival"
        );
        if !self.subscribed {
            return;
        }
        self.records.push(Diagnostic {
            event: event.clone(),
            time_adjustment,
        });
    }

    /// Hands over everything recorded since the last call.
    pub(crate) fn take(&mut self) -> Vec<Diagnostic<T>> {
        std::mem::take(&mut self.records)
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_emit_order() {
        let mut emitter = DiagnosticsEmitter::new(true);
        emitter.emit(&RawEvent::start_edge(3, "a"), None);
        emitter.emit(&RawEvent::start_edge(1, "b"), Some(6));

        let records = emitter.take();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_drop());
        assert_eq!(records[1].time_adjustment, Some(6));
        assert_eq!(records[1].event.start_time, 1);

        assert!(emitter.take().is_empty());
    }

    #[test]
    fn test_unsubscribed_records_nothing() {
        let mut emitter = DiagnosticsEmitter::new(false);
        emitter.emit(&RawEvent::start_edge(3, "a"), None);
        assert!(!emitter.is_subscribed());
        assert!(emitter.take().is_empty());
    }
}
