//! Accumulation buffer between producers and the schedulers.
//!
//! Producers push whole frames of any length, schedulers shift fixed-size frames out.
//! Whatever the queue holds, a shift always returns exactly the requested number of
//! samples per channel, padded with silence.

use crate::{
    error::{Result, StreamError},
    frame::Frame,
};

/// Threshold for compacting buffer - when read position exceeds this, we shift data.
/// At 48kHz, 48000 samples = 1 second worth of consumed audio.
const COMPACT_THRESHOLD: usize = 48000;

#[derive(Debug)]
pub struct FrameQueue {
    channels: usize,
    samples_per_frame: usize,
    /// Read position into every channel of `buffer`
    position: usize,
    buffer: Vec<Vec<f32>>,
    is_empty: bool,
    /// Real samples handed out since creation - for progress tracking
    delivered_samples: u64,
    /// Silence handed out in place of missing data
    padded_samples: u64,
}

impl FrameQueue {
    pub fn new(channels: usize, samples_per_frame: usize) -> Self {
        Self {
            channels,
            samples_per_frame,
            position: 0,
            buffer: vec![Vec::new(); channels],
            is_empty: true,
            delivered_samples: 0,
            padded_samples: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// True when no real data is buffered.
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Buffered samples per channel not yet shifted out.
    pub fn len(&self) -> usize {
        self.buffer
            .first()
            .map(|ch| ch.len().saturating_sub(self.position))
            .unwrap_or(0)
    }

    /// Drops all buffered data. Counters are kept.
    pub fn clear(&mut self) {
        self.position = 0;
        for ch in &mut self.buffer {
            ch.clear();
        }
        self.is_empty = true;
    }

    /// Compact the buffer by removing already-consumed samples
    fn compact(&mut self) {
        if self.position > 0 {
            for ch in &mut self.buffer {
                ch.drain(..self.position);
            }
            self.position = 0;
        }
    }

    /// Appends `frame` after everything already queued.
    pub fn push(&mut self, frame: Frame) -> Result<()> {
        if frame.channels() != self.channels {
            return Err(StreamError::ChannelMismatch {
                expected: self.channels,
                actual: frame.channels(),
            });
        }

        for (dst, src) in self.buffer.iter_mut().zip(frame.into_channels()) {
            dst.extend(src);
        }
        self.is_empty = false;

        Ok(())
    }

    /// Shifts exactly `size` samples per channel, padding with silence if not enough
    /// are available.
    pub fn shift(&mut self, size: usize) -> Frame {
        if self.is_empty {
            self.padded_samples += size as u64;
            return Frame::silence(self.channels, size);
        }

        let available = self.len();

        let data = if available <= size {
            let data = self
                .buffer
                .iter()
                .map(|ch| {
                    let mut out = Vec::with_capacity(size);
                    out.extend_from_slice(&ch[self.position..]);
                    // Pad with silence if not enough samples
                    out.resize(size, 0.0);
                    out
                })
                .collect();

            self.clear();
            self.delivered_samples += available as u64;
            self.padded_samples += (size - available) as u64;
            data
        } else {
            let data = self
                .buffer
                .iter()
                .map(|ch| ch[self.position..self.position + size].to_vec())
                .collect();

            self.position += size;
            self.delivered_samples += size as u64;

            // Compact periodically to prevent unbounded growth
            if self.position >= COMPACT_THRESHOLD {
                self.compact();
            }
            data
        };

        // Every channel has exactly `size` samples by construction
        Frame::from_channels(data).unwrap_or_else(|_| Frame::silence(self.channels, size))
    }

    /// Shifts one configured frame.
    pub fn shift_frame(&mut self) -> Frame {
        self.shift(self.samples_per_frame)
    }

    pub fn delivered_samples(&self) -> u64 {
        self.delivered_samples
    }

    pub fn padded_samples(&self) -> u64 {
        self.padded_samples
    }

    /// Get playback position of the real data handed out, in seconds
    pub fn delivered_secs(&self, sample_rate: u32) -> f64 {
        self.delivered_samples as f64 / sample_rate as f64
    }
}
