use crate::{frame::Frame, normalize::Chunk};
use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use std::{fs::File, path::PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;

/// Decoded packets buffered ahead of the stream.
const DECODE_BACKLOG: usize = 16;

/// Decodes `path` on a blocking thread and yields its packets as chunks of
/// `channels` channels. The stream ends with the file or on the first decode error.
pub fn stream(
    path: impl Into<PathBuf>,
    sample_rate: u32,
    channels: usize,
) -> Result<BoxStream<'static, Chunk>> {
    let path = path.into();
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;

    let (tx, rx) = mpsc::channel(DECODE_BACKLOG);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = decode_file(file, sample_rate, channels, tx) {
            error!("Error while decoding file {}: {:?}", path.display(), e);
        }
    });

    Ok(stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Chunk::from(frame), rx))
    })
    .boxed())
}

fn decode_file(
    file: File,
    sample_rate: u32,
    channels: usize,
    tx: mpsc::Sender<Frame>,
) -> Result<()> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let format_opts: FormatOptions = Default::default();
    let metadata_opts: MetadataOptions = Default::default();
    let decoder_opts: DecoderOptions = Default::default();

    let probed =
        symphonia::default::get_probe().format(&Hint::new(), mss, &format_opts, &metadata_opts)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .context("Could not find any tracks in file")?;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decoder_opts)?;
    let track_id = track.id;

    if let Some(rate) = track.codec_params.sample_rate {
        if rate != sample_rate {
            warn!(
                "File is {rate} Hz but the stream runs at {sample_rate} Hz, \
                 playing without resampling"
            );
        }
    }

    let mut sample_buf = None;

    loop {
        let packet = format.next_packet();

        // Symphonia seems to return UnexpectedEof even if the EOF was expected,
        // handle this gracefully
        let packet = match &packet {
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                return Ok(());
            }
            _ => packet?,
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();

        let buf = sample_buf.get_or_insert_with(|| {
            // Note: capacity, not length
            SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(audio_buf);

        let decoded = Frame::from_interleaved(buf.samples(), spec.channels.count())?;
        if tx.blocking_send(remap_channels(decoded, channels)).is_err() {
            debug!("Decoded stream dropped, stopping decoder");
            return Ok(());
        }
    }
}

/// Fits a decoded frame to the stream's channel count. Extra channels are dropped,
/// missing ones repeat the last available channel.
fn remap_channels(frame: Frame, channels: usize) -> Frame {
    if frame.channels() == channels || frame.channels() == 0 {
        return frame;
    }

    let data = (0..channels)
        .map(|ch| frame.channel(ch.min(frame.channels() - 1)).to_vec())
        .collect();

    Frame::from_channels(data).unwrap_or_else(|_| Frame::silence(channels, frame.len()))
}
