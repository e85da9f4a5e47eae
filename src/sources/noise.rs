use crate::{frame::Frame, normalize::Chunk};
use futures::stream::{self, BoxStream, StreamExt};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Endless uniform white noise in `[-amplitude, amplitude]`.
pub struct Noise {
    rng: StdRng,
    amplitude: f32,
    channels: usize,
    chunk_len: usize,
}

impl Noise {
    pub fn new(amplitude: f32, channels: usize, chunk_len: usize) -> Self {
        Self::with_rng(StdRng::from_os_rng(), amplitude, channels, chunk_len)
    }

    /// Reproducible noise.
    pub fn seeded(seed: u64, amplitude: f32, channels: usize, chunk_len: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), amplitude, channels, chunk_len)
    }

    fn with_rng(rng: StdRng, amplitude: f32, channels: usize, chunk_len: usize) -> Self {
        Self {
            rng,
            amplitude: amplitude.abs(),
            channels,
            chunk_len,
        }
    }
}

impl Iterator for Noise {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let amplitude = self.amplitude;
        let data = (0..self.channels)
            .map(|_| {
                (0..self.chunk_len)
                    .map(|_| self.rng.random_range(-amplitude..=amplitude))
                    .collect()
            })
            .collect();

        Some(Frame::from_channels(data).unwrap_or_default())
    }
}

pub fn stream(amplitude: f32, channels: usize, chunk_len: usize) -> BoxStream<'static, Chunk> {
    stream::iter(Noise::new(amplitude, channels, chunk_len))
        .map(Chunk::from)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_within_amplitude() {
        let mut noise = Noise::seeded(7, 0.25, 2, 256);

        let frame = noise.next().unwrap();

        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.len(), 256);
        assert!(frame.channels_iter().flatten().all(|s| s.abs() <= 0.25));
        assert!(!frame.is_silent());
    }

    #[test]
    fn same_seed_same_noise() {
        let a = Noise::seeded(42, 1.0, 1, 32).next();
        let b = Noise::seeded(42, 1.0, 1, 32).next();

        assert_eq!(a, b);
    }
}
