//! Conversion of producer input into planar [`Frame`]s.
//!
//! Producers may hand over native frames, planar or flat sample arrays, or raw PCM
//! bytes. Everything is normalized here, at the producer boundary, so the queue and
//! schedulers only ever see `Frame`.

use crate::{
    config::{ByteOrder, PcmFormat},
    error::{Result, StreamError},
    frame::Frame,
};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use bytes::Bytes;

/// One unit of producer input.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    /// Already planar, already `f32`.
    Frame(Frame),

    /// One `Vec` per channel.
    Planar(Vec<Vec<f32>>),

    /// Flat sample array, interleaved or channel-after-channel depending on the format.
    Samples(Vec<f32>),

    /// Raw PCM bytes described by the stream's [`PcmFormat`].
    Bytes(Bytes),
}

impl From<Frame> for Chunk {
    fn from(frame: Frame) -> Self {
        Chunk::Frame(frame)
    }
}

impl From<Vec<Vec<f32>>> for Chunk {
    fn from(data: Vec<Vec<f32>>) -> Self {
        Chunk::Planar(data)
    }
}

impl From<Vec<f32>> for Chunk {
    fn from(samples: Vec<f32>) -> Self {
        Chunk::Samples(samples)
    }
}

impl From<&[f32]> for Chunk {
    fn from(samples: &[f32]) -> Self {
        Chunk::Samples(samples.to_vec())
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(bytes))
    }
}

/// Normalizes `chunk` into a frame with exactly `channels` channels.
pub fn normalize(chunk: Chunk, format: &PcmFormat, channels: usize) -> Result<Frame> {
    let frame = match chunk {
        Chunk::Frame(frame) => frame,
        Chunk::Planar(data) => Frame::from_channels(data)?,
        Chunk::Samples(samples) => from_flat(&samples, format.interleaved, channels)?,
        Chunk::Bytes(bytes) => {
            let samples = decode_bytes(&bytes, format)?;
            from_flat(&samples, format.interleaved, channels)?
        }
    };

    if frame.channels() != channels {
        return Err(StreamError::ChannelMismatch {
            expected: channels,
            actual: frame.channels(),
        });
    }

    Ok(frame)
}

fn from_flat(samples: &[f32], interleaved: bool, channels: usize) -> Result<Frame> {
    if interleaved {
        return Frame::from_interleaved(samples, channels);
    }

    if channels == 0 || samples.len() % channels != 0 {
        return Err(StreamError::MalformedChunk(format!(
            "{} samples do not divide into {channels} channels",
            samples.len()
        )));
    }

    let len = samples.len() / channels;
    if len == 0 {
        return Ok(Frame::silence(channels, 0));
    }
    Frame::from_channels(samples.chunks_exact(len).map(<[f32]>::to_vec).collect())
}

/// Decodes raw PCM into `f32` samples in the `[-1, 1)` range.
pub fn decode_bytes(bytes: &[u8], format: &PcmFormat) -> Result<Vec<f32>> {
    let width = format.bytes_per_sample();
    if width == 0 || bytes.len() % width != 0 {
        return Err(StreamError::MalformedChunk(format!(
            "{} bytes is not a whole number of {}-bit samples",
            bytes.len(),
            format.bit_depth
        )));
    }

    let samples = match format.byte_order {
        ByteOrder::LE => decode_with::<LittleEndian>(bytes, format)?,
        ByteOrder::BE => decode_with::<BigEndian>(bytes, format)?,
    };

    Ok(samples)
}

fn decode_with<B: byteorder::ByteOrder>(bytes: &[u8], format: &PcmFormat) -> Result<Vec<f32>> {
    let width = format.bytes_per_sample();
    let samples = bytes.chunks_exact(width);

    let out = match (format.float, format.bit_depth, format.signed) {
        (true, 32, _) => samples.map(|b| B::read_f32(b)).collect(),
        (true, 64, _) => samples.map(|b| B::read_f64(b) as f32).collect(),
        (false, 8, true) => samples.map(|b| b[0] as i8 as f32 / 128.0).collect(),
        (false, 8, false) => samples.map(|b| (b[0] as f32 - 128.0) / 128.0).collect(),
        (false, 16, true) => samples.map(|b| B::read_i16(b) as f32 / 32768.0).collect(),
        (false, 16, false) => samples
            .map(|b| (B::read_u16(b) as f32 - 32768.0) / 32768.0)
            .collect(),
        (false, 24, true) => samples
            .map(|b| B::read_i24(b) as f32 / 8_388_608.0)
            .collect(),
        (false, 24, false) => samples
            .map(|b| (B::read_u24(b) as f32 - 8_388_608.0) / 8_388_608.0)
            .collect(),
        (false, 32, true) => samples
            .map(|b| (B::read_i32(b) as f64 / 2_147_483_648.0) as f32)
            .collect(),
        (false, 32, false) => samples
            .map(|b| ((B::read_u32(b) as f64 - 2_147_483_648.0) / 2_147_483_648.0) as f32)
            .collect(),
        (float, depth, _) => {
            return Err(StreamError::MalformedChunk(format!(
                "unsupported {} bit depth {depth}",
                if float { "float" } else { "integer" }
            )))
        }
    };

    Ok(out)
}

/// Encodes samples as interleaved signed 16-bit little-endian PCM.
pub fn encode_i16_le(frame: &Frame) -> Vec<u8> {
    let samples = frame.to_interleaved();
    let mut out = vec![0u8; samples.len() * 2];
    for (dst, sample) in out.chunks_exact_mut(2).zip(samples) {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        LittleEndian::write_i16(dst, value);
    }
    out
}
