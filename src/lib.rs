//! sink-stream library crate
//!
//! Streams audio from producers that write whenever they have data into a sink that
//! consumes fixed-size frames on its own clock. Missing data becomes silence, never an
//! error. The demo binary is in main.rs.

#[macro_use]
extern crate log;

pub mod buffer;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod frame;
pub mod normalize;
pub mod pipe;
pub mod pull_scheduler;
pub mod push_scheduler;
pub mod reader;
pub mod release;
pub mod sink;
pub mod sinks;
pub mod sources;
pub mod stream;

pub use config::{Mode, PcmFormat, StreamConfig};
pub use error::StreamError;
pub use event::StreamEvent;
pub use frame::Frame;
pub use normalize::Chunk;
pub use reader::Reader;
pub use release::{Release, ReleaseOutcome};
pub use sink::{Clock, Sink};
pub use stream::{Lifecycle, Producer, SinkStream};
