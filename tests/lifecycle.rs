//! Integration tests for stream lifecycle and producer fan-in.

mod common;

use common::*;
use std::time::Duration;

/// Test start connects the sink before the processor runs.
#[test]
fn test_start_connects_and_runs() {
    let mut harness = TestHarness::new(script_config(4));
    assert_eq!(harness.stream.state(), Lifecycle::Created);

    harness.stream.start().unwrap();

    assert_eq!(harness.stream.state(), Lifecycle::Running);
    assert_eq!(harness.sink.connect_count(), 1);
    assert!(harness.sink.is_running());
    assert_event_received!(
        harness.events(),
        StreamEvent::Started { mode: Mode::Script }
    );
}

/// Test start is only allowed once.
#[test]
fn test_start_twice_fails() {
    let harness = TestHarness::started(script_config(4));

    assert_eq!(harness.stream.start(), Err(StreamError::AlreadyStarted));

    harness.stream.end();
    assert_eq!(harness.stream.start(), Err(StreamError::Ended));
}

/// Test end twice emits one Ended event and disconnects once.
#[test]
fn test_end_is_idempotent() {
    let mut harness = TestHarness::started(script_config(4));

    harness.stream.end();
    harness.stream.end();

    let events = harness.events();
    assert_eq!(
        events.iter().filter(|e| **e == StreamEvent::Ended).count(),
        1
    );
    assert_eq!(
        events.iter().filter(|e| **e == StreamEvent::Ending).count(),
        1
    );
    assert_eq!(harness.sink.disconnect_count(), 1);
    assert_eq!(harness.stream.state(), Lifecycle::Ended);
}

/// Test ending a stream that never started does not touch the sink.
#[test]
fn test_end_before_start() {
    let mut harness = TestHarness::new(script_config(4));

    harness.stream.end();

    assert!(harness.stream.is_ended());
    assert_eq!(harness.sink.connect_count(), 0);
    assert_eq!(harness.sink.disconnect_count(), 0);
    assert_event_received!(harness.events(), StreamEvent::Ended);
}

/// Test nothing is delivered once end returns.
#[test]
fn test_no_delivery_after_end() {
    let harness = TestHarness::started(script_config(4));
    let _ = harness.stream.write(constant(8, 1.0)).unwrap();

    harness.stream.end();

    assert!(harness.render(8).is_silent());
    assert_eq!(harness.stream.stats().buffered, 8);
}

/// Test writes after end are refused.
#[test]
fn test_write_after_end_fails() {
    let harness = TestHarness::started(script_config(4));
    let producer = harness.stream.producer();

    harness.stream.end();

    assert_eq!(
        harness.stream.write(constant(4, 1.0)).err(),
        Some(StreamError::Ended)
    );
    assert_eq!(producer.write(constant(4, 1.0)).err(), Some(StreamError::Ended));
}

/// Test end resolves credits that were never going to be released.
#[test]
fn test_end_resolves_pending_releases() {
    let harness = TestHarness::started(script_config(4));
    let producer = harness.stream.producer();
    let mut own = harness.stream.write(constant(4, 1.0)).unwrap();
    let mut other = producer.write(constant(4, 1.0)).unwrap();

    harness.stream.end();

    assert_eq!(own.try_outcome(), Some(ReleaseOutcome::Ended));
    assert_eq!(other.try_outcome(), Some(ReleaseOutcome::Ended));
    assert_eq!(harness.stream.stats().pending_releases, 0);
}

/// Test the ended future resolves once teardown is complete.
#[tokio::test]
async fn test_ended_resolves_after_end() {
    let harness = TestHarness::started(script_config(4));
    let stream = harness.stream.clone();

    let waiter = tokio::spawn(async move { stream.ended().await });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    harness.stream.end();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}

/// Test attaching and detaching producers updates the input count.
#[test]
fn test_input_count_follows_producers() {
    let mut harness = TestHarness::started(script_config(4));
    harness.events();

    let a = harness.stream.producer();
    let b = harness.stream.producer();
    assert_eq!(harness.stream.input_count(), 2);
    assert_ne!(a.id(), b.id());

    drop(a);
    assert_eq!(harness.stream.input_count(), 1);
    b.finish();
    assert_eq!(harness.stream.input_count(), 0);

    let events = harness.events();
    assert_event_received!(events, StreamEvent::InputAttached { inputs: 2, .. });
    assert_event_received!(events, StreamEvent::InputDetached { inputs: 0, .. });
    // Without autoend, finishing only detaches
    assert_eq!(harness.stream.state(), Lifecycle::Running);
}

/// Test with autoend the first producer to finish ends the stream.
#[test]
fn test_autoend_first_finisher_wins() {
    let config = StreamConfig {
        autoend: true,
        ..script_config(4)
    };
    let harness = TestHarness::started(config);
    let a = harness.stream.producer();
    let b = harness.stream.producer();
    let mut pending = b.write(constant(4, 1.0)).unwrap();

    a.finish();

    assert!(harness.stream.is_ended());
    assert_eq!(pending.try_outcome(), Some(ReleaseOutcome::Ended));
    assert_eq!(b.write(constant(4, 1.0)).err(), Some(StreamError::Ended));
}

/// Test dropping a producer resolves its own pending credit.
#[test]
fn test_dropping_producer_cancels_its_credit() {
    let harness = TestHarness::started(script_config(4));
    let producer = harness.stream.producer();
    let id = producer.id();
    let mut release = producer.write(constant(4, 1.0)).unwrap();
    assert!(harness.stream.is_waiting(id));

    drop(producer);

    assert!(!harness.stream.is_waiting(id));
    assert_eq!(release.try_outcome(), Some(ReleaseOutcome::Ended));
    // The audio itself stays queued
    assert_eq!(harness.render(4).channel(0), &[1.0; 4]);
}

/// Test invalid configurations are rejected at construction.
#[test]
fn test_invalid_config_is_rejected() {
    let sink = OfflineSink::new(RATE, 1);

    let no_channels = StreamConfig {
        channels: 0,
        ..Default::default()
    };
    assert!(matches!(
        SinkStream::new(Box::new(sink.clone()), no_channels),
        Err(StreamError::InvalidConfig(_))
    ));

    let no_frame = StreamConfig {
        samples_per_frame: 0,
        ..Default::default()
    };
    assert!(matches!(
        SinkStream::new(Box::new(sink), no_frame),
        Err(StreamError::InvalidConfig(_))
    ));

    let silent_sink = OfflineSink::new(0, 1);
    assert!(matches!(
        SinkStream::new(Box::new(silent_sink), script_config(4)),
        Err(StreamError::InvalidSink(_))
    ));
}

/// Test the sample rate comes from the sink unless overridden.
#[test]
fn test_sample_rate_override() {
    let harness = TestHarness::new(script_config(4));
    assert_eq!(harness.stream.sample_rate(), RATE);

    let config = StreamConfig {
        sample_rate: Some(22050),
        ..script_config(4)
    };
    let harness = TestHarness::new(config);
    assert_eq!(harness.stream.sample_rate(), 22050);
}

/// Test the full event sequence of a stream.
#[tokio::test]
async fn test_event_sequence() {
    let harness = TestHarness::new(script_config(4));
    let mut subscriber = harness.stream.subscribe();

    harness.stream.start().unwrap();
    harness.stream.end();

    let started = wait_for_event(&mut subscriber, Duration::from_millis(100), |e| {
        matches!(e, StreamEvent::Started { .. })
    })
    .await;
    assert!(started.is_some());

    let mut rest = Vec::new();
    while let Ok(event) = subscriber.try_recv() {
        rest.push(event);
    }
    assert_eq!(rest, vec![StreamEvent::Ending, StreamEvent::Ended]);
}
