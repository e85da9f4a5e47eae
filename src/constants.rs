// Defaults for the audio parameters
pub const DEFAULT_SAMPLE_RATE: u32 = 44100; // used when neither sink nor config provides one
pub const DEFAULT_CHANNELS: usize = 2; // Stereo channel
pub const DEFAULT_SAMPLES_PER_FRAME: usize = 1024;
pub const DEFAULT_BIT_DEPTH: u16 = 16; // raw byte input, 16 bits per sample

/// How many frames the buffer-mode ring holds.
pub const FOLD: usize = 2;

/// Bit depth of the PCM streamed by the network sink.
pub const NET_BIT_DEPTH: u16 = 16;
