use crate::{frame::Frame, normalize::Chunk};
use futures::stream::{self, BoxStream, StreamExt};

const AMPLITUDE: f64 = 0.5; // 50% amplitude

/// Endless sine tone, one chunk of `chunk_len` samples per item.
pub struct Sine {
    phase: f64,
    step: f64,
    channels: usize,
    chunk_len: usize,
}

impl Sine {
    pub fn new(frequency: f64, sample_rate: u32, channels: usize, chunk_len: usize) -> Self {
        Self {
            phase: 0.0,
            step: frequency / sample_rate as f64,
            channels,
            chunk_len,
        }
    }
}

impl Iterator for Sine {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let mut samples = Vec::with_capacity(self.chunk_len);
        for _ in 0..self.chunk_len {
            samples.push(sine_wave(self.phase));

            // Wrap the phase around 1.0 to avoid losing precision
            self.phase = (self.phase + self.step) % 1.0;
        }

        Some(Frame::from_channels(vec![samples; self.channels]).unwrap_or_default())
    }
}

pub fn stream(
    frequency: f64,
    sample_rate: u32,
    channels: usize,
    chunk_len: usize,
) -> BoxStream<'static, Chunk> {
    stream::iter(Sine::new(frequency, sample_rate, channels, chunk_len))
        .map(Chunk::from)
        .boxed()
}

fn sine_wave(phase: f64) -> f32 {
    ((phase * std::f64::consts::TAU).sin() * AMPLITUDE) as f32
}
