//! Planar block of `f32` samples.

use crate::error::{Result, StreamError};

/// A fixed-channel-count block of samples, stored one `Vec` per channel.
///
/// All channels always have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    data: Vec<Vec<f32>>,
}

impl Frame {
    /// Creates a frame of `len` zero samples on each of `channels` channels.
    pub fn silence(channels: usize, len: usize) -> Self {
        Self {
            data: vec![vec![0.0; len]; channels],
        }
    }

    /// Builds a frame from per-channel sample vectors of equal length.
    pub fn from_channels(data: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(first) = data.first() {
            let len = first.len();
            if let Some(bad) = data.iter().position(|ch| ch.len() != len) {
                return Err(StreamError::MalformedChunk(format!(
                    "channel {bad} has {} samples, channel 0 has {len}",
                    data[bad].len()
                )));
            }
        }
        Ok(Self { data })
    }

    /// Builds a frame by de-interleaving `samples` across `channels`.
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(StreamError::MalformedChunk("zero channels".to_string()));
        }
        if samples.len() % channels != 0 {
            return Err(StreamError::MalformedChunk(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }

        let len = samples.len() / channels;
        let mut data = vec![Vec::with_capacity(len); channels];
        for block in samples.chunks_exact(channels) {
            for (ch, sample) in block.iter().enumerate() {
                data[ch].push(*sample);
            }
        }

        Ok(Self { data })
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.data[ch]
    }

    pub fn channels_iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.iter().map(Vec::as_slice)
    }

    pub(crate) fn into_channels(self) -> Vec<Vec<f32>> {
        self.data
    }

    /// Overwrites every sample with silence.
    pub fn fill_silence(&mut self) {
        for ch in &mut self.data {
            ch.fill(0.0);
        }
    }

    /// Returns true if every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.data.iter().flatten().all(|s| *s == 0.0)
    }

    /// Copies `src` into this frame starting at sample `offset`.
    ///
    /// Samples that would land past the end are dropped, missing channels are left
    /// untouched.
    pub fn copy_from(&mut self, src: &Frame, offset: usize) {
        for (dst, src) in self.data.iter_mut().zip(src.data.iter()) {
            if offset >= dst.len() {
                continue;
            }
            let n = src.len().min(dst.len() - offset);
            dst[offset..offset + n].copy_from_slice(&src[..n]);
        }
    }

    /// Returns `len` samples per channel starting at `offset`, wrapping around the end.
    pub fn slice_wrapping(&self, offset: usize, len: usize) -> Frame {
        let size = self.len();
        if size == 0 {
            return Frame::silence(self.channels(), len);
        }

        let data = self
            .data
            .iter()
            .map(|ch| (0..len).map(|i| ch[(offset + i) % size]).collect())
            .collect();

        Frame { data }
    }

    /// Appends `other` to the end of this frame. Channel counts must match.
    pub fn append(&mut self, other: &Frame) {
        if self.data.is_empty() {
            self.data = other.data.clone();
            return;
        }
        for (dst, src) in self.data.iter_mut().zip(other.data.iter()) {
            dst.extend_from_slice(src);
        }
    }

    /// Removes and returns up to `len` samples per channel from the front.
    pub fn take_front(&mut self, len: usize) -> Frame {
        let len = len.min(self.len());
        let data = self
            .data
            .iter_mut()
            .map(|ch| ch.drain(..len).collect())
            .collect();

        Frame { data }
    }

    /// Interleaves the channels into a single sample vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let len = self.len();
        let mut out = Vec::with_capacity(len * self.channels());
        for i in 0..len {
            for ch in &self.data {
                out.push(ch[i]);
            }
        }
        out
    }
}
