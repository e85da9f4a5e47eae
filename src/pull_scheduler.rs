//! Buffer mode: a timer keeps a looping ring filled ahead of the playback cursor.
//!
//! The sink loops a ring of `FOLD` frames. The playback cursor is never read from the
//! timer, it is derived from the sink clock: `played = (now - origin) * sample_rate`.
//! Every tick renders frames until more than one frame of lead time is buffered, then
//! sleeps until the instant the lead drops back to one frame.

use crate::{
    constants::FOLD,
    event::{EventBus, StreamEvent},
    frame::Frame,
    pipe::SharedPipe,
    sink::{lock, Clock, SharedRing},
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// What the timer should do after a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    /// Wake up again after this long.
    Sleep(Duration),

    /// The stream ended, stop ticking.
    Stopped,
}

pub struct PullScheduler {
    pipe: SharedPipe,
    bus: EventBus,
    ring: SharedRing,
    frame_size: u64,
    sample_rate: f64,
    /// Clock time at which the first ring sample reaches the cursor
    origin: f64,
    /// Position from which there is no data rendered yet
    last_rendered: u64,
}

impl PullScheduler {
    pub fn new(
        pipe: SharedPipe,
        bus: EventBus,
        channels: usize,
        frame_size: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            pipe,
            bus,
            ring: Arc::new(Mutex::new(Frame::silence(channels, frame_size * FOLD))),
            frame_size: frame_size as u64,
            sample_rate: sample_rate as f64,
            origin: 0.0,
            last_rendered: 0,
        }
    }

    pub fn ring(&self) -> SharedRing {
        self.ring.clone()
    }

    pub fn set_origin(&mut self, origin: f64) {
        self.origin = origin;
    }

    pub fn last_rendered(&self) -> u64 {
        self.last_rendered
    }

    fn ring_len(&self) -> u64 {
        self.frame_size * FOLD as u64
    }

    /// Renders as much as the ring allows at clock time `now`.
    pub fn tick(&mut self, now: f64) -> Tick {
        let played_time = (now - self.origin).max(0.0);
        // Whole samples, so lead time comparisons are exact
        let played = (played_time * self.sample_rate).round() as u64;

        // Woke up after the cursor already passed unrendered data: the looped ring
        // replayed stale audio, so skip ahead instead of rendering into the past
        if played > self.last_rendered {
            let target = played.div_ceil(self.frame_size) * self.frame_size;
            let skipped = target - self.last_rendered;
            warn!(
                "Buffer mode woke {:.1} ms late, skipping {skipped} samples ahead",
                (played - self.last_rendered) as f64 / self.sample_rate * 1000.0
            );
            self.bus.send(StreamEvent::Resync {
                skipped_samples: skipped,
            });
            self.last_rendered = target;
        }

        let mut rendered = 0;
        while self.last_rendered - played <= self.frame_size && rendered < FOLD {
            let data = match lock(&self.pipe).deliver(self.frame_size as usize, &self.bus) {
                Some(data) => data,
                None => return Tick::Stopped,
            };

            let offset = (self.last_rendered % self.ring_len()) as usize;
            lock(&self.ring).copy_from(&data, offset);

            self.last_rendered += self.frame_size;
            rendered += 1;
        }

        // Starving is when the cursor gets within one frame of unrendered data,
        // i.e. at (last_rendered - frame_size) / sample_rate past the origin
        let lead = self.last_rendered - played;
        let remaining = lead.saturating_sub(self.frame_size) as f64 / self.sample_rate;

        Tick::Sleep(Duration::from_secs_f64(remaining))
    }

    /// Drives `tick` from a one-shot timer until cancelled or the pipe stops.
    pub async fn run(mut self, clock: Arc<dyn Clock>, cancel: CancellationToken) {
        loop {
            let delay = match self.tick(clock.current_time()) {
                Tick::Sleep(delay) => delay,
                Tick::Stopped => break,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Buffer mode timer stopped");
    }
}
