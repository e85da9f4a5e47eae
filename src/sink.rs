//! The rendering endpoint the stream feeds.
//!
//! A sink is the hardware-facing side: it owns a monotonic clock and a sample rate,
//! can be wired into and out of its destination, and consumes audio in one of two ways:
//!
//! - **processor** (script mode): the sink calls a [`ProcessHandler`] once per period
//!   with an input block and an output block to fill;
//! - **loop** (buffer mode): the sink plays a [`SharedRing`] in a loop and the stream
//!   writes ahead of the playback cursor.
//!
//! Starting either without connecting first is allowed by hosts but may produce
//! nothing, so callers connect before they start.

use crate::{error::Result, frame::Frame};
use std::sync::{Arc, Mutex};

/// Called by the sink once per processing period.
///
/// The first argument is the block captured on the sink's input, the second is the
/// output block for this period, pre-filled with silence.
pub type ProcessHandler = Box<dyn FnMut(&Frame, &mut Frame) + Send>;

/// Looping buffer shared between buffer mode and the sink.
pub type SharedRing = Arc<Mutex<Frame>>;

/// Monotonic playback clock.
pub trait Clock: Send + Sync {
    /// Seconds since an arbitrary fixed origin.
    fn current_time(&self) -> f64;
}

pub trait Sink: Send {
    fn sample_rate(&self) -> u32;

    fn clock(&self) -> Arc<dyn Clock>;

    /// Measured delay in seconds between starting a source and its first sample
    /// reaching the playback cursor.
    fn output_latency(&self) -> f64 {
        0.0
    }

    /// Wires the processing node to the destination.
    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self);

    /// Starts calling `handler` every `frame_size` samples.
    fn start_processor(&mut self, frame_size: usize, handler: ProcessHandler) -> Result<()>;

    /// Starts looping `ring` from its first sample.
    fn start_loop(&mut self, ring: SharedRing) -> Result<()>;

    /// Stops the processor or loop, if running.
    fn stop(&mut self);
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
