//! Deterministic sink that only renders when asked to.
//!
//! Its clock is the number of samples rendered so far, so time stands still between
//! calls to [`OfflineSink::render`]. Handy for tests and for rendering to a file.

use crate::{
    error::{Result, StreamError},
    frame::Frame,
    sink::{lock, Clock, ProcessHandler, SharedRing, Sink},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

struct FrameClock {
    rendered: AtomicU64,
    sample_rate: u32,
}

impl Clock for FrameClock {
    fn current_time(&self) -> f64 {
        self.rendered.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }
}

enum Output {
    Idle,
    Processor {
        frame_size: usize,
        /// Taken out while the handler runs
        handler: Option<ProcessHandler>,
    },
    Loop {
        ring: SharedRing,
        /// Clock position at which the loop started
        started_at: u64,
    },
}

struct State {
    connected: bool,
    connects: usize,
    disconnects: usize,
    output: Output,
    /// Processor output not yet rendered
    pending: Frame,
    /// Injected input not yet handed to the processor
    input: Frame,
    captured: Frame,
}

#[derive(Clone)]
pub struct OfflineSink {
    channels: usize,
    sample_rate: u32,
    latency: f64,
    clock: Arc<FrameClock>,
    state: Arc<Mutex<State>>,
}

impl OfflineSink {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            channels,
            sample_rate,
            latency: 0.0,
            clock: Arc::new(FrameClock {
                rendered: AtomicU64::new(0),
                sample_rate,
            }),
            state: Arc::new(Mutex::new(State {
                connected: false,
                connects: 0,
                disconnects: 0,
                output: Output::Idle,
                pending: Frame::silence(channels, 0),
                input: Frame::silence(channels, 0),
                captured: Frame::silence(channels, 0),
            })),
        }
    }

    /// Delays the looping source by `latency` seconds after it starts.
    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    /// Samples rendered since creation.
    pub fn position(&self) -> u64 {
        self.clock.rendered.load(Ordering::SeqCst)
    }

    /// Queues samples for the processor's input block.
    pub fn feed_input(&self, frame: &Frame) {
        lock(&self.state).input.append(frame);
    }

    /// Everything rendered so far.
    pub fn captured(&self) -> Frame {
        lock(&self.state).captured.clone()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn disconnect_count(&self) -> usize {
        lock(&self.state).disconnects
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn is_running(&self) -> bool {
        !matches!(lock(&self.state).output, Output::Idle)
    }

    /// Renders `len` samples per channel and advances the clock by as much.
    ///
    /// An unconnected or idle sink renders silence.
    pub fn render(&self, len: usize) -> Frame {
        let mut out = Frame::silence(self.channels, 0);

        while out.len() < len {
            let block = self.render_block(len - out.len());
            self.clock
                .rendered
                .fetch_add(block.len() as u64, Ordering::SeqCst);
            out.append(&block);
        }

        lock(&self.state).captured.append(&out);
        out
    }

    fn render_block(&self, max: usize) -> Frame {
        let (ring, started_at, frame_size, mut handler, input) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if !state.connected {
                return Frame::silence(self.channels, max);
            }
            if !state.pending.is_empty() {
                return state.pending.take_front(max);
            }

            match &mut state.output {
                Output::Idle => return Frame::silence(self.channels, max),
                Output::Loop { ring, started_at } => {
                    (Some(ring.clone()), *started_at, 0, None, None)
                }
                Output::Processor {
                    frame_size,
                    handler,
                } => {
                    let mut input = state.input.take_front(*frame_size);
                    let missing = *frame_size - input.len();
                    input.append(&Frame::silence(self.channels, missing));
                    (None, 0, *frame_size, handler.take(), Some(input))
                }
            }
        };

        if let Some(ring) = ring {
            return self.read_loop(&ring, started_at, max);
        }

        let (Some(handler_fn), Some(input)) = (handler.as_mut(), input) else {
            return Frame::silence(self.channels, max);
        };

        // Called unlocked, the handler may end the stream and with it stop this sink
        let mut output = Frame::silence(self.channels, frame_size);
        handler_fn(&input, &mut output);

        let mut state = lock(&self.state);
        match &mut state.output {
            Output::Processor { handler: slot, .. } if slot.is_none() => {
                *slot = handler.take();
                state.pending = output;
                state.pending.take_front(max)
            }
            // Stopped or restarted meanwhile, the rest of this block is never played
            _ => output.take_front(max),
        }
    }

    fn read_loop(&self, ring: &SharedRing, started_at: u64, len: usize) -> Frame {
        let latency = (self.latency * self.sample_rate as f64).round() as u64;
        let position = self.position() - started_at;

        // Nothing reaches the cursor before the start latency has passed
        if position < latency {
            let silent = (latency - position).min(len as u64) as usize;
            return Frame::silence(self.channels, silent);
        }

        let ring = lock(ring);
        ring.slice_wrapping((position - latency) as usize % ring.len().max(1), len)
    }
}

impl Sink for OfflineSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn output_latency(&self) -> f64 {
        self.latency
    }

    fn connect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.disconnects += 1;
    }

    fn start_processor(&mut self, frame_size: usize, handler: ProcessHandler) -> Result<()> {
        if frame_size == 0 {
            return Err(StreamError::Sink("zero frame size".to_string()));
        }

        let mut state = lock(&self.state);
        state.pending = Frame::silence(self.channels, 0);
        state.output = Output::Processor {
            frame_size,
            handler: Some(handler),
        };
        Ok(())
    }

    fn start_loop(&mut self, ring: SharedRing) -> Result<()> {
        let started_at = self.position();
        lock(&self.state).output = Output::Loop { ring, started_at };
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.output = Output::Idle;
        state.pending = Frame::silence(self.channels, 0);
    }
}
