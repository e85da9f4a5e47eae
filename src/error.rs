//! Error type shared by the stream engine.

use thiserror::Error;

/// Errors surfaced by the stream engine.
///
/// Starvation is never an error: an empty queue yields silence. The variants below
/// are either configuration problems caught at setup, problems with a producer's own
/// input, or writes that arrive after the stream has ended.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown mode `{0}`, expected `script` or `buffer`")]
    UnknownMode(String),

    #[error("invalid sink: {0}")]
    InvalidSink(String),

    #[error("expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("no tokio runtime available to drive the scheduler")]
    NoRuntime,

    #[error("stream already started")]
    AlreadyStarted,

    #[error("stream has ended")]
    Ended,
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
