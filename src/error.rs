use thiserror::Error;

use crate::models::EventKind;

/// Errors raised by the timeline core
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    /// Index outside `[0, len)`; the timeline is left untouched
    #[error("Index {index} out of range for timeline of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    /// Address string could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A conference event was built with a message kind
    #[error("Event kind {0:?} needs a message body")]
    MissingMessage(EventKind),
}

pub type Result<T> = std::result::Result<T, TimelineError>;
