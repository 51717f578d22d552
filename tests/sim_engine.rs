//! Integration tests for the simulated voice engine.
//!
//! These run the engine's real audio thread, so they wait on wall-clock
//! time rather than driving ticks by hand.

mod common;

use common::*;
use std::time::Duration;
use tdvoip_rs::engine::sim::SimEngine;

fn simulator(connect_delay_ms: u64, capture_wav: Option<String>) -> SimulatorConfig {
    SimulatorConfig {
        connect_delay_ms,
        capture_wav,
    }
}

async fn wait_for_state(call: &Call, state: CallState) -> bool {
    for _ in 0..200 {
        if call.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// The engine connects, plays the queue and records it.
#[tokio::test]
async fn test_sim_engine_plays_and_records() {
    let dir = tempfile::TempDir::new().unwrap();
    let capture = dir.path().join("capture.wav");
    let a = write_raw(dir.path().join("a.raw"), &[1000; 960]);

    let bus = EventBus::new();
    let mut subscriber = bus.subscribe();
    // Long enough for the file to be queued before the first frame
    let engine = SimEngine::new(simulator(50, Some(capture.display().to_string())));
    let call = Call::create(
        test_record(9),
        &EngineTuning::default(),
        Box::new(engine),
        bus.clone(),
    );
    call.play(PlayRequest::File(a));

    assert!(wait_for_state(&call, CallState::Established).await);

    // Give the audio thread time for a handful of frames
    tokio::time::sleep(Duration::from_millis(200)).await;

    let debug = call.debug();
    assert_eq!(debug["engine"]["engine"], "simulated");
    assert!(debug["engine"]["frames_captured"].as_u64().unwrap() > 0);

    call.hangup();
    assert_eq!(call.state(), CallState::Ended);

    let event = wait_for_event(&mut subscriber, Duration::from_secs(2), |event| {
        matches!(event, Event::Signaling(_))
    })
    .await;
    assert!(matches!(
        event,
        Some(Event::Signaling(SignalingAction::DiscardCall {
            call_id: 9,
            is_disconnected: false,
            connection_id: MOCK_RELAY_ID,
            ..
        }))
    ));

    // The audio thread finalizes the capture once it notices the stop
    tokio::time::sleep(Duration::from_millis(200)).await;

    let reader = hound::WavReader::open(&capture).expect("Capture file missing");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 48000);
    let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
    assert!(samples.len() >= 960);
    assert!(samples[..960].iter().all(|&s| s == 1000));
}

/// Without endpoints the engine reports a failed connection.
#[tokio::test]
async fn test_sim_engine_fails_without_endpoints() {
    let mut json = call_json(10);
    json["state"]["connections"] = serde_json::json!([]);
    let record = CallRecord::from_json(&json).unwrap();

    let bus = EventBus::new();
    let mut subscriber = bus.subscribe();
    let call = Call::create(
        record,
        &EngineTuning::default(),
        Box::new(SimEngine::new(simulator(0, None))),
        bus.clone(),
    );

    assert!(wait_for_state(&call, CallState::Failed).await);

    let event = wait_for_event(&mut subscriber, Duration::from_secs(2), |event| {
        matches!(event, Event::Signaling(_))
    })
    .await;
    assert!(matches!(
        event,
        Some(Event::Signaling(SignalingAction::DiscardCall {
            call_id: 10,
            is_disconnected: true,
            connection_id: 0,
            duration: 0,
        }))
    ));
}
