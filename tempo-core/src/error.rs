use thiserror::Error;

use crate::message::Timestamp;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An event arrived later than the Throw policy tolerates. The pipeline is failed afterwards.
    #[error("Fatal Disorder - start time {start_time} is behind cutoff {cutoff}")]
    FatalDisorder {
        start_time: Timestamp,
        cutoff: Timestamp,
    },

    #[error("Invalid Interval - end time {end_time} is not after start time {start_time}")]
    InvalidInterval {
        start_time: Timestamp,
        end_time: Timestamp,
    },

    #[error("Pipeline Failed - no further events can be processed")]
    PipelineFailed,

    #[error("Pipeline Closed - no further events can be processed")]
    PipelineClosed,

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),

    #[error("Forwarder Error - {0}")]
    Forwarder(String),
}

impl Error {
    /// Returns true for errors that put the pipeline into the failed state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalDisorder { .. } | Error::InvalidInterval { .. }
        )
    }
}
