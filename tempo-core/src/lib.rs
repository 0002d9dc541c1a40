//! Ingress stage of a temporal stream processor. An [IngressPipeline] takes events in arrival
//! order, tracks the high-water mark of their start times, applies a [DisorderPolicy] to events
//! that arrive too late, and releases everything else in non-decreasing sync-time order, optionally
//! interleaved with periodic punctuations. [IngressForwarder] runs a pipeline between tokio
//! channels.

mod error;
pub use crate::error::{Error, Result};

pub mod config;
pub use crate::config::{DisorderPolicy, IngressConfig, PunctuationPolicy};

pub mod message;
pub use crate::message::{Diagnostic, INFINITY, OutputEvent, RawEvent, TimeSelector, Timestamp};

mod pipeline;
pub use crate::pipeline::{IngressPipeline, PipelineStatus};

mod forwarder;
pub use crate::forwarder::IngressForwarder;

mod metrics;
pub use crate::metrics::metrics_text;

mod punctuation;
pub use crate::punctuation::snap;

mod diagnostics;
mod lateness;
mod reorder;
mod watermark;
