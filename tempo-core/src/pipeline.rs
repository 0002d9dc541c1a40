//! [IngressPipeline] turns an arrival-ordered sequence of [RawEvent]s into a sync-time ordered
//! sequence of [OutputEvent]s. Each [IngressPipeline::push] runs the event through:
//! - the watermark tracker (always with the original start time)
//! - the lateness check against the watermark before this event
//! - the diagnostic channel, if the event was dropped or adjusted
//! - the reorder buffer, from which everything at or below `watermark - lag` is released
//! - the punctuation generator, which checks every released entry
//!
//! [IngressPipeline::close] drains the buffer without a cutoff and ends the stream with a
//! punctuation at [INFINITY]. The pipeline owns all of its state; partitioned inputs get one
//! pipeline per partition.

use tracing::{info, warn};

use crate::config::IngressConfig;
use crate::diagnostics::DiagnosticsEmitter;
use crate::error::{Error, Result};
use crate::lateness::{self, Verdict};
use crate::message::{Diagnostic, INFINITY, OutputEvent, RawEvent, TimeSelector, Timestamp};
use crate::metrics::{ingress_metrics, pipeline_metric_labels};
use crate::punctuation::PunctuationGenerator;
use crate::reorder::ReorderBuffer;
use crate::watermark::WatermarkTracker;

/// Lifecycle of an [IngressPipeline].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Running,
    /// A fatal error was returned, every further call fails with [Error::PipelineFailed].
    Failed,
    /// [IngressPipeline::close] completed, every further call fails with [Error::PipelineClosed].
    Closed,
}

/// Mutable state of one pipeline, only touched by `push` and `close`.
#[derive(Debug)]
struct EngineState<T> {
    watermark: WatermarkTracker,
    pending: ReorderBuffer<T>,
    punctuation: PunctuationGenerator,
}

#[derive(Debug)]
pub struct IngressPipeline<T> {
    config: IngressConfig,
    state: EngineState<T>,
    diagnostics: DiagnosticsEmitter<T>,
    selector: Option<TimeSelector<T>>,
    status: PipelineStatus,
    metric_labels: Vec<(String, String)>,
}

impl<T: Clone> IngressPipeline<T> {
    /// Creates a running pipeline, the config is validated first.
    pub fn new(config: IngressConfig) -> Result<Self> {
        config.validate()?;
        let metric_labels = pipeline_metric_labels(&config.name, config.disorder.kind());
        info!(name = %config.name, disorder = %config.disorder, punctuation = ?config.punctuation,
            diagnostics = config.diagnostics, "Creating ingress pipeline");

        Ok(Self {
            state: EngineState {
                watermark: WatermarkTracker::new(),
                pending: ReorderBuffer::new(),
                punctuation: PunctuationGenerator::new(config.punctuation),
            },
            diagnostics: DiagnosticsEmitter::new(config.diagnostics),
            selector: None,
            status: PipelineStatus::Running,
            metric_labels,
            config,
        })
    }

    /// Sets the selector used by [IngressPipeline::push_payload].
    pub fn with_selector(mut self, selector: TimeSelector<T>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Processes one arrival and returns the events it released, possibly none. Late events are
    /// reported through [IngressPipeline::take_diagnostics], in arrival order. When diagnostics are
    /// subscribed the caller must take them after every push: records are kept until taken, so a
    /// caller that never takes them grows the pipeline without bound.
    pub fn push(&mut self, event: RawEvent<T>) -> Result<Vec<OutputEvent<T>>> {
        self.ensure_running()?;
        let metrics = ingress_metrics();
        metrics.read_total.get_or_create(&self.metric_labels).inc();

        if let Some(end_time) = event.end_time.filter(|end| *end <= event.start_time) {
            return Err(self.fail(Error::InvalidInterval {
                start_time: event.start_time,
                end_time,
            }));
        }

        let prior_watermark = self.state.watermark.advance(event.start_time);
        let verdict = lateness::evaluate(&event, prior_watermark, &self.config.disorder);

        match verdict {
            Verdict::Fatal { cutoff } => {
                warn!(name = %self.config.name, start_time = event.start_time, cutoff,
                    "Event arrived beyond the tolerated lateness, failing the pipeline");
                return Err(self.fail(Error::FatalDisorder {
                    start_time: event.start_time,
                    cutoff,
                }));
            }
            Verdict::Drop => {
                metrics.dropped_total.get_or_create(&self.metric_labels).inc();
            }
            Verdict::Adjust { .. } => {
                metrics.adjusted_total.get_or_create(&self.metric_labels).inc();
            }
            Verdict::Accept => {}
        }

        if verdict.is_reported() {
            self.diagnostics.emit(&event, verdict.time_adjustment());
        }

        if let Some(accepted) = verdict.apply(event) {
            let key = accepted.start_time;
            self.state.pending.insert(key, accepted.into_output());
        }

        let cutoff = self.config.disorder.cutoff(self.state.watermark.current());
        let released = self.state.pending.release(cutoff);
        let emitted = self.punctuate(released);
        self.update_gauges();
        Ok(emitted)
    }

    /// Builds the event from `payload` with the configured [TimeSelector] and pushes it.
    pub fn push_payload(&mut self, payload: T) -> Result<Vec<OutputEvent<T>>> {
        let event = match &self.selector {
            Some(selector) => selector.select(payload),
            None => {
                return Err(Error::Config(
                    "no time selector configured for the pipeline".to_string(),
                ));
            }
        };
        self.push(event)
    }

    /// Ends the input: releases everything still buffered and appends the terminal punctuation.
    pub fn close(&mut self) -> Result<Vec<OutputEvent<T>>> {
        self.ensure_running()?;

        if !self.state.pending.is_empty() {
            info!(name = %self.config.name, pending = self.state.pending.len(),
                "Draining the reorder buffer");
        }
        let drained = self.state.pending.drain();
        let mut emitted = self.punctuate(drained);
        emitted.push(OutputEvent::Punctuation {
            sync_time: INFINITY,
        });
        ingress_metrics()
            .punctuation_total
            .get_or_create(&self.metric_labels)
            .inc();

        self.status = PipelineStatus::Closed;
        self.update_gauges();
        info!(name = %self.config.name, watermark = self.state.watermark.current(),
            emitted = emitted.len(), "Ingress pipeline closed");
        Ok(emitted)
    }

    /// Hands over the diagnostics recorded since the last call, in arrival order. Always empty
    /// when the config did not subscribe to diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic<T>> {
        self.diagnostics.take()
    }

    pub fn diagnostics_subscribed(&self) -> bool {
        self.diagnostics.is_subscribed()
    }

    /// Emits released entries in order, each followed by a punctuation when it crosses a period.
    fn punctuate(&mut self, released: Vec<(Timestamp, OutputEvent<T>)>) -> Vec<OutputEvent<T>> {
        let metrics = ingress_metrics();
        let mut emitted = Vec::with_capacity(released.len());
        for (key, event) in released {
            emitted.push(event);
            metrics.emitted_total.get_or_create(&self.metric_labels).inc();
            if let Some(sync_time) = self.state.punctuation.on_release(key) {
                emitted.push(OutputEvent::Punctuation { sync_time });
                metrics
                    .punctuation_total
                    .get_or_create(&self.metric_labels)
                    .inc();
            }
        }
        emitted
    }
}

impl<T> IngressPipeline<T> {
    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Largest raw start time seen so far.
    pub fn watermark(&self) -> Timestamp {
        self.state.watermark.current()
    }

    /// Number of accepted events not yet released.
    pub fn pending(&self) -> usize {
        self.state.pending.len()
    }

    /// Smallest effective start time still held back, if any.
    pub fn next_release_time(&self) -> Option<Timestamp> {
        self.state.pending.peek_key()
    }

    pub fn last_punctuation_time(&self) -> Timestamp {
        self.state.punctuation.last_punctuation_time()
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            PipelineStatus::Running => Ok(()),
            PipelineStatus::Failed => Err(Error::PipelineFailed),
            PipelineStatus::Closed => Err(Error::PipelineClosed),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.status = PipelineStatus::Failed;
        self.update_gauges();
        error
    }

    fn update_gauges(&self) {
        let metrics = ingress_metrics();
        metrics
            .pending
            .get_or_create(&self.metric_labels)
            .set(i64::try_from(self.state.pending.len()).unwrap_or(i64::MAX));
        metrics
            .watermark
            .get_or_create(&self.metric_labels)
            .set(self.state.watermark.current());
    }
}
