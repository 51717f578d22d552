//! Test infrastructure for tdvoip-rs integration tests.
//!
//! Provides a mock voice engine, raw sample file helpers and event bus
//! utilities, so calls can be driven tick by tick without a network.

#![allow(dead_code, unused_imports)]

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

// Re-export key types from the main crate
pub use tdvoip_rs::call::{Call, CallState, PlayRequest};
pub use tdvoip_rs::config::{Config, EngineTuning, SimulatorConfig};
pub use tdvoip_rs::engine::{EngineConfig, EngineHooks, VoiceEngine};
pub use tdvoip_rs::event::{Event, EventBus, Subscriber};
pub use tdvoip_rs::queue::Origin;
pub use tdvoip_rs::record::CallRecord;
pub use tdvoip_rs::script::CallAction;
pub use tdvoip_rs::signaling::SignalingAction;

pub const MOCK_RELAY_ID: i64 = 6456;

/// Call object in the shape the signaling client hands over.
pub fn call_json(id: i64) -> serde_json::Value {
    serde_json::json!({
        "@type": "call",
        "id": id,
        "is_outgoing": false,
        "state": {
            "@type": "callStateReady",
            "protocol": { "udp_p2p": false, "max_layer": 74 },
            "connections": [{
                "id": MOCK_RELAY_ID.to_string(),
                "ip": "149.154.167.51",
                "ipv6": "",
                "port": 531,
                "peer_tag": "AAECAw=="
            }],
            "config": "{}",
            "encryption_key": "AQIDBA=="
        }
    })
}

pub fn test_record(id: i64) -> CallRecord {
    CallRecord::from_json(&call_json(id)).expect("Failed to parse test call")
}

/// What the mock engine has been asked to do.
#[derive(Default)]
pub struct MockEngineState {
    pub config: Option<EngineConfig>,
    pub hooks: Option<Arc<dyn EngineHooks>>,
    pub stop_count: usize,
}

/// Engine that does nothing on its own. Tests drive the hooks by hand.
pub struct MockEngine {
    state: Arc<Mutex<MockEngineState>>,

    /// State reported from inside start(), if any
    report_on_start: Option<CallState>,
}

impl MockEngine {
    pub fn new() -> (Self, Arc<Mutex<MockEngineState>>) {
        let state = Arc::new(Mutex::new(MockEngineState::default()));
        let engine = Self {
            state: state.clone(),
            report_on_start: None,
        };
        (engine, state)
    }

    pub fn reporting_on_start(state: CallState) -> (Self, Arc<Mutex<MockEngineState>>) {
        let (mut engine, shared) = Self::new();
        engine.report_on_start = Some(state);
        (engine, shared)
    }
}

impl VoiceEngine for MockEngine {
    fn start(&mut self, config: EngineConfig, hooks: Arc<dyn EngineHooks>) {
        {
            let mut state = self.state.lock().unwrap();
            state.config = Some(config);
            state.hooks = Some(hooks.clone());
        }
        if let Some(report) = self.report_on_start {
            hooks.on_state_changed(report);
        }
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stop_count += 1;
    }

    fn preferred_relay_id(&self) -> i64 {
        MOCK_RELAY_ID
    }

    fn debug_log(&self) -> serde_json::Value {
        serde_json::json!({ "engine": "mock" })
    }
}

/// Test harness wrapping a call, its mock engine and the event bus.
pub struct TestHarness {
    pub bus: EventBus,
    pub call: Arc<Call>,
    pub engine: Arc<Mutex<MockEngineState>>,
    pub subscriber: Subscriber,
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    /// Creates a call in the Connecting state.
    pub fn new() -> Self {
        let (engine, state) = MockEngine::new();
        Self::with_engine(engine, state)
    }

    pub fn with_engine(engine: MockEngine, state: Arc<Mutex<MockEngineState>>) -> Self {
        let bus = EventBus::new();
        let subscriber = bus.subscribe();
        let call = Call::create(
            test_record(1),
            &EngineTuning::default(),
            Box::new(engine),
            bus.clone(),
        );

        Self {
            bus,
            call,
            engine: state,
            subscriber,
            dir: tempfile::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates a call that is already established.
    pub fn established() -> Self {
        let harness = Self::new();
        harness.report(CallState::Established);
        harness
    }

    pub fn hooks(&self) -> Arc<dyn EngineHooks> {
        self.engine
            .lock()
            .unwrap()
            .hooks
            .clone()
            .expect("Engine was never started")
    }

    /// Reports a state change the way the engine would.
    pub fn report(&self, state: CallState) {
        self.hooks().on_state_changed(state);
    }

    /// Runs one audio tick and returns what the call produced.
    pub fn tick(&self, frame_count: usize) -> Vec<i16> {
        let mut buf = vec![0; frame_count];
        self.hooks().on_captured(&mut buf);
        buf
    }

    /// Writes a raw sample file into the harness' temp directory.
    pub fn raw_file(&self, name: &str, samples: &[i16]) -> String {
        write_raw(self.dir.path().join(name), samples)
    }

    pub fn stop_count(&self) -> usize {
        self.engine.lock().unwrap().stop_count
    }

    /// Drains every signaling event received so far.
    pub fn signaling_events(&mut self) -> Vec<SignalingAction> {
        let mut events = Vec::new();
        loop {
            match self.subscriber.try_recv() {
                Ok(Event::Signaling(action)) => events.push(action),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `samples` as a raw 16-bit little-endian file, returns its path.
pub fn write_raw(path: PathBuf, samples: &[i16]) -> String {
    let mut file = File::create(&path).expect("Failed to create sample file");
    for &sample in samples {
        file.write_i16::<LittleEndian>(sample)
            .expect("Failed to write sample");
    }
    path.display().to_string()
}

/// Waits for a specific type of event within a timeout.
pub async fn wait_for_event<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    matches: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
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
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}
