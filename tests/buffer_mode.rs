//! Integration tests for buffer mode.
//!
//! Tokio time is paused, and the offline sink clock only moves when a test renders.
//! Every test renders one frame, then sleeps one frame so the timer task can run.

mod common;

use common::*;
use std::time::Duration;

const FRAME: usize = 480; // 10 ms at 48 kHz
const FRAME_TIME: Duration = Duration::from_millis(10);

/// Test the ring plays every written frame in order, then silence.
#[tokio::test(start_paused = true)]
async fn test_plays_frames_in_order() {
    let harness = TestHarness::new(buffer_config(FRAME));
    for value in [1.0, 2.0, 3.0] {
        let _ = harness.stream.write(constant(FRAME, value)).unwrap();
    }
    harness.stream.start().unwrap();

    let mut rendered = Vec::new();
    for _ in 0..5 {
        rendered.push(harness.render(FRAME));
        tokio::time::sleep(FRAME_TIME).await;
    }

    assert_eq!(rendered[0].channel(0), &[1.0; FRAME]);
    assert_eq!(rendered[1].channel(0), &[2.0; FRAME]);
    assert_eq!(rendered[2].channel(0), &[3.0; FRAME]);
    assert!(rendered[3].is_silent());
    assert!(rendered[4].is_silent());
}

/// Test audio written while running is picked up by later ticks.
#[tokio::test(start_paused = true)]
async fn test_plays_data_written_while_running() {
    let harness = TestHarness::started(buffer_config(FRAME));

    harness.render(FRAME);
    tokio::time::sleep(FRAME_TIME).await;
    let _ = harness.stream.write(constant(FRAME, 0.25)).unwrap();

    let mut heard = Vec::new();
    for _ in 0..4 {
        heard.extend(audible(&harness.render(FRAME)));
        tokio::time::sleep(FRAME_TIME).await;
    }

    assert_eq!(heard, vec![0.25; FRAME]);
}

/// Test the start latency delays playback without reordering it.
#[tokio::test(start_paused = true)]
async fn test_output_latency_offsets_playback() {
    let sink = OfflineSink::new(RATE, 1).with_latency(0.005);
    let harness = TestHarness::with_sink(sink, buffer_config(FRAME));
    let _ = harness.stream.write(ramp(1, 2 * FRAME)).unwrap();
    harness.stream.start().unwrap();

    let mut captured = Frame::default();
    for _ in 0..4 {
        captured.append(&harness.render(FRAME));
        tokio::time::sleep(FRAME_TIME).await;
    }

    assert!(captured.channel(0)[..240].iter().all(|s| *s == 0.0));
    let expected: Vec<f32> = (1..=2 * FRAME).map(|i| i as f32).collect();
    assert_eq!(audible(&captured), expected);
}

/// Test a timer that fires too late skips ahead of the cursor.
#[tokio::test(start_paused = true)]
async fn test_late_timer_resyncs() {
    let mut harness = TestHarness::started(buffer_config(FRAME));

    // Sink keeps playing while the timer task never gets to run
    for _ in 0..5 {
        harness.render(FRAME);
    }
    tokio::time::sleep(FRAME_TIME).await;

    assert_event_received!(harness.events(), StreamEvent::Resync { .. });
}

/// Test every delivered frame hands back one credit.
#[tokio::test(start_paused = true)]
async fn test_timer_releases_credits() {
    let harness = TestHarness::new(buffer_config(FRAME));
    harness.stream.start().unwrap();
    let producer = harness.stream.producer();

    let send = producer.send(constant(FRAME, 1.0));
    let outcome = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(send, async {
            for _ in 0..3 {
                harness.render(FRAME);
                tokio::time::sleep(FRAME_TIME).await;
            }
        })
        .0
    })
    .await
    .unwrap();

    assert_eq!(outcome, Ok(ReleaseOutcome::Released));
}

/// Test end stops the timer, the loop and the connection.
#[tokio::test(start_paused = true)]
async fn test_end_tears_everything_down() {
    let mut harness = TestHarness::started(buffer_config(FRAME));
    let _ = harness.stream.write(constant(4 * FRAME, 1.0)).unwrap();
    tokio::time::sleep(FRAME_TIME).await;

    harness.stream.end();
    let stats = harness.stream.stats();
    tokio::time::sleep(FRAME_TIME * 5).await;

    assert!(!harness.sink.is_running());
    assert!(!harness.sink.is_connected());
    assert_eq!(harness.sink.disconnect_count(), 1);
    assert!(harness.render(FRAME).is_silent());
    assert_eq!(harness.stream.stats().buffered, stats.buffered);

    let events = harness.events();
    assert_event_received!(events, StreamEvent::Ended);
}

/// Test buffer mode needs a runtime to drive its timer.
#[test]
fn test_start_without_runtime_fails() {
    let harness = TestHarness::new(buffer_config(FRAME));

    assert_eq!(harness.stream.start(), Err(StreamError::NoRuntime));
    assert_eq!(harness.stream.state(), Lifecycle::Created);
    assert_eq!(harness.sink.connect_count(), 0);
}
