//! State shared between producers and whichever scheduler is running.

use crate::{
    buffer::FrameQueue,
    event::{EventBus, StreamEvent},
    frame::Frame,
    release::ReleaseSlots,
};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct Pipe {
    pub queue: FrameQueue,
    pub releases: ReleaseSlots,
    /// Set on end, no frame is delivered afterwards
    pub stopped: bool,
}

pub type SharedPipe = Arc<Mutex<Pipe>>;

impl Pipe {
    pub fn new(channels: usize, samples_per_frame: usize) -> Self {
        Self {
            queue: FrameQueue::new(channels, samples_per_frame),
            releases: ReleaseSlots::new(),
            stopped: false,
        }
    }

    pub fn shared(channels: usize, samples_per_frame: usize) -> SharedPipe {
        Arc::new(Mutex::new(Self::new(channels, samples_per_frame)))
    }

    /// Shifts one frame of `size` samples and releases the oldest pending credit.
    ///
    /// Returns `None` once the pipe is stopped.
    pub fn deliver(&mut self, size: usize, bus: &EventBus) -> Option<Frame> {
        if self.stopped {
            return None;
        }

        let was_empty = self.queue.is_empty();
        let frame = self.queue.shift(size);
        if !was_empty && self.queue.is_empty() {
            debug!("Queue drained, padding with silence until next push");
            bus.send(StreamEvent::Drained);
        }

        self.releases.release_next();

        Some(frame)
    }
}
