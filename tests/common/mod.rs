//! Test infrastructure for sink-stream integration tests.
//!
//! Wraps a stream around an offline sink so tests control exactly when audio is
//! rendered and how far the clock moves.

#![allow(dead_code)]

use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

// Re-export key types from the main crate
pub use sink_stream::config::{Mode, PcmFormat, StreamConfig};
pub use sink_stream::error::StreamError;
pub use sink_stream::event::{StreamEvent, Subscriber};
pub use sink_stream::frame::Frame;
pub use sink_stream::normalize::Chunk;
pub use sink_stream::release::{Release, ReleaseOutcome};
pub use sink_stream::sinks::OfflineSink;
pub use sink_stream::stream::{Lifecycle, Producer, SinkStream};

pub const RATE: u32 = 48000;

/// Mono script mode stream with tiny frames.
pub fn script_config(samples_per_frame: usize) -> StreamConfig {
    StreamConfig {
        channels: 1,
        samples_per_frame,
        mode: Mode::Script,
        ..Default::default()
    }
}

/// Mono buffer mode stream.
pub fn buffer_config(samples_per_frame: usize) -> StreamConfig {
    StreamConfig {
        channels: 1,
        samples_per_frame,
        mode: Mode::Buffer,
        ..Default::default()
    }
}

/// A mono frame holding `len` copies of `value`.
pub fn constant(len: usize, value: f32) -> Frame {
    Frame::from_channels(vec![vec![value; len]]).unwrap()
}

/// A mono frame counting up from `start`.
pub fn ramp(start: usize, len: usize) -> Frame {
    Frame::from_channels(vec![(start..start + len).map(|i| i as f32).collect()]).unwrap()
}

/// Test harness owning a stream and the offline sink it renders into.
pub struct TestHarness {
    pub sink: OfflineSink,
    pub stream: SinkStream,
    subscriber: Subscriber,
}

impl TestHarness {
    /// Creates a stream over a fresh offline sink running at [`RATE`].
    pub fn new(config: StreamConfig) -> Self {
        let sink = OfflineSink::new(RATE, config.channels);
        Self::with_sink(sink, config)
    }

    pub fn with_sink(sink: OfflineSink, config: StreamConfig) -> Self {
        let stream = SinkStream::new(Box::new(sink.clone()), config).unwrap();
        let subscriber = stream.subscribe();
        Self {
            sink,
            stream,
            subscriber,
        }
    }

    /// Creates and starts the stream.
    pub fn started(config: StreamConfig) -> Self {
        let harness = Self::new(config);
        harness.stream.start().unwrap();
        harness
    }

    /// Renders `len` samples per channel.
    pub fn render(&self, len: usize) -> Frame {
        self.sink.render(len)
    }

    /// Every event emitted since the last call.
    pub fn events(&mut self) -> Vec<StreamEvent> {
        self.subscriber.drain()
    }
}

/// Samples of channel 0 that are not silence, in render order.
pub fn audible(frame: &Frame) -> Vec<f32> {
    frame
        .channel(0)
        .iter()
        .copied()
        .filter(|s| *s != 0.0)
        .collect()
}

/// Waits for a specific event within a timeout.
pub async fn wait_for_event<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    matches: F,
) -> Option<StreamEvent>
where
    F: Fn(&StreamEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}

/// Asserts that a specific event type was received.
#[macro_export]
macro_rules! assert_event_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            $events.iter().any(|e| matches!(e, $pattern)),
            "Expected event matching {} not found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}

/// Asserts that a specific event type was NOT received.
#[macro_export]
macro_rules! assert_event_not_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            !$events.iter().any(|e| matches!(e, $pattern)),
            "Unexpected event matching {} found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}
