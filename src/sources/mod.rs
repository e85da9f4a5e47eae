//! Demo sources for the binary.
//!
//! Every source is an endless (or file-length) stream of chunks, ready to be handed to
//! [`Producer::pipe`](crate::stream::Producer::pipe).

pub mod noise;
pub mod sine;
pub mod symphonia;

use crate::{config::SourceConfig, normalize::Chunk};
use anyhow::Result;
use futures::stream::BoxStream;

/// Opens the source described by `config`.
pub fn open(
    config: &SourceConfig,
    sample_rate: u32,
    channels: usize,
    chunk_len: usize,
) -> Result<BoxStream<'static, Chunk>> {
    let source = match config {
        SourceConfig::Sine { frequency } => {
            info!("Playing a {frequency} Hz sine");
            sine::stream(*frequency, sample_rate, channels, chunk_len)
        }
        SourceConfig::Noise { amplitude } => {
            info!("Playing white noise at amplitude {amplitude}");
            noise::stream(*amplitude, channels, chunk_len)
        }
        SourceConfig::File { path } => {
            info!("Playing {path}");
            symphonia::stream(path, sample_rate, channels)?
        }
    };

    Ok(source)
}
