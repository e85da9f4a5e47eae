use crate::{
    constants::{DEFAULT_BIT_DEPTH, DEFAULT_CHANNELS, DEFAULT_SAMPLES_PER_FRAME},
    error::StreamError,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};
use tokio::fs::read_to_string;

/// How frames are scheduled into the sink.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The sink's periodic process notification pulls one frame per cycle.
    #[default]
    #[serde(alias = "push")]
    Script,

    /// A timer keeps a looping ring buffer filled ahead of the playback cursor.
    #[serde(alias = "pull")]
    Buffer,
}

impl FromStr for Mode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" | "push" => Ok(Mode::Script),
            "buffer" | "pull" => Ok(Mode::Buffer),
            other => Err(StreamError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Script => write!(f, "script"),
            Mode::Buffer => write!(f, "buffer"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    #[serde(alias = "le")]
    LE,
    #[serde(alias = "be")]
    BE,
}

/// Describes how raw sample arrays and byte buffers are laid out.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PcmFormat {
    pub bit_depth: u16,
    pub float: bool,
    pub signed: bool,
    pub interleaved: bool,
    pub byte_order: ByteOrder,
}

impl Default for PcmFormat {
    fn default() -> Self {
        PcmFormat {
            bit_depth: DEFAULT_BIT_DEPTH,
            float: false,
            signed: true,
            interleaved: true,
            byte_order: ByteOrder::LE,
        }
    }
}

impl PcmFormat {
    /// 32-bit float, little endian, interleaved.
    pub fn float32() -> Self {
        PcmFormat {
            bit_depth: 32,
            float: true,
            ..Default::default()
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth / 8) as usize
    }

    fn validate(&self) -> Result<(), StreamError> {
        let ok = if self.float {
            matches!(self.bit_depth, 32 | 64)
        } else {
            matches!(self.bit_depth, 8 | 16 | 24 | 32)
        };

        if ok {
            Ok(())
        } else {
            Err(StreamError::InvalidConfig(format!(
                "unsupported {} bit depth {}",
                if self.float { "float" } else { "integer" },
                self.bit_depth
            )))
        }
    }
}

/// Per-stream configuration, passed explicitly at construction.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub channels: usize,
    pub samples_per_frame: usize,
    pub mode: Mode,

    /// Overrides the sink's sample rate when set.
    pub sample_rate: Option<u32>,

    /// End the whole stream as soon as any attached producer finishes.
    pub autoend: bool,

    /// Layout of raw (non-frame) input chunks.
    pub format: PcmFormat,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            channels: DEFAULT_CHANNELS,
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            mode: Mode::default(),
            sample_rate: None,
            autoend: false,
            format: PcmFormat::default(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channels == 0 {
            return Err(StreamError::InvalidConfig(
                "channels must be at least 1".to_string(),
            ));
        }
        if self.samples_per_frame == 0 {
            return Err(StreamError::InvalidConfig(
                "samples_per_frame must be positive".to_string(),
            ));
        }
        if self.sample_rate == Some(0) {
            return Err(StreamError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        self.format.validate()
    }
}

/// Demo source played by the binary.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Sine { frequency: f64 },
    Noise { amplitude: f32 },
    File { path: String },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Sine { frequency: 440.0 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Address the network sink listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Sample rate of the network sink.
    #[serde(default = "default_sink_rate")]
    pub sink_sample_rate: u32,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

fn default_listen() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_sink_rate() -> u32 {
    crate::constants::DEFAULT_SAMPLE_RATE
}

pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config = read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config = toml::from_str(&config)?;
    config.stream.validate()?;

    Ok(config)
}
