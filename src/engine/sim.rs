//! Stand-in voice engine.
//!
//! Connects after a fixed delay, then runs its own audio thread that asks
//! for one frame every 20 ms, exactly like the real engine would, and
//! optionally records the frames into a WAV file.

use super::{EngineConfig, EngineHooks, VoiceEngine};
use crate::{
    call::CallState,
    config::SimulatorConfig,
    constants::{BIT_DEPTH, CHANNELS, FRAME_SIZE, SAMPLE_RATE},
    lock::PoisonlessLock,
};
use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::{
    fs::File,
    io::BufWriter,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct SimStats {
    frames_captured: AtomicU64,
    frames_rendered: AtomicU64,
    state: Mutex<Option<CallState>>,
}

pub struct SimEngine {
    settings: SimulatorConfig,
    cancel: CancellationToken,
    stats: Arc<SimStats>,
    relay_id: i64,
    endpoint_count: usize,
    started: bool,
}

impl SimEngine {
    pub fn new(settings: SimulatorConfig) -> Self {
        Self {
            settings,
            cancel: CancellationToken::new(),
            stats: Default::default(),
            relay_id: 0,
            endpoint_count: 0,
            started: false,
        }
    }
}

impl VoiceEngine for SimEngine {
    fn start(&mut self, config: EngineConfig, hooks: Arc<dyn EngineHooks>) {
        if self.started {
            warn!("Simulated engine for call {} already started", config.call_id);
            return;
        }
        self.started = true;
        self.relay_id = config.endpoints.first().map(|e| e.id).unwrap_or_default();
        self.endpoint_count = config.endpoints.len();

        info!(
            "Simulated engine connecting call {} via {} endpoints (p2p: {}, layer: {})",
            config.call_id, self.endpoint_count, config.allow_p2p, config.max_layer
        );

        let cancel = self.cancel.clone();
        let stats = self.stats.clone();
        let settings = self.settings.clone();
        let can_connect = !config.endpoints.is_empty();

        let spawned = std::thread::Builder::new()
            .name("sim-audio".to_string())
            .spawn(move || run(settings, can_connect, cancel, stats, hooks));

        if let Err(e) = spawned {
            error!("Could not spawn simulated audio thread: {:?}", e);
        }
    }

    fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping simulated engine");
            self.cancel.cancel();
        }
    }

    fn preferred_relay_id(&self) -> i64 {
        self.relay_id
    }

    fn debug_log(&self) -> serde_json::Value {
        serde_json::json!({
            "engine": "simulated",
            "state": *self.stats.state.plock(),
            "endpoints": self.endpoint_count,
            "frames_captured": self.stats.frames_captured.load(Ordering::Relaxed),
            "frames_rendered": self.stats.frames_rendered.load(Ordering::Relaxed),
        })
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn report(stats: &SimStats, hooks: &dyn EngineHooks, state: CallState) {
    *stats.state.plock() = Some(state);
    hooks.on_state_changed(state);
}

/// Sleeps for `duration` unless cancelled first. Returns false if cancelled.
fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
    }
}

fn create_capture(path: &str) -> Result<WavWriter<BufWriter<File>>> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BIT_DEPTH,
        sample_format: SampleFormat::Int,
    };

    Ok(WavWriter::create(path, spec)?)
}

fn run(
    settings: SimulatorConfig,
    can_connect: bool,
    cancel: CancellationToken,
    stats: Arc<SimStats>,
    hooks: Arc<dyn EngineHooks>,
) {
    *stats.state.plock() = Some(CallState::Connecting);

    if !sleep_unless_cancelled(&cancel, Duration::from_millis(settings.connect_delay_ms)) {
        return;
    }

    if !can_connect {
        warn!("No endpoints to connect to");
        report(&stats, hooks.as_ref(), CallState::Failed);
        return;
    }

    report(&stats, hooks.as_ref(), CallState::Established);

    let mut capture = match settings.capture_wav.as_deref().map(create_capture) {
        Some(Ok(writer)) => Some(writer),
        Some(Err(e)) => {
            error!("Could not create capture file: {:?}", e);
            None
        }
        None => None,
    };

    let frame_period =
        Duration::from_secs_f64(FRAME_SIZE as f64 / SAMPLE_RATE as f64);
    let mut frame = vec![0i16; FRAME_SIZE];
    let silence = vec![0i16; FRAME_SIZE];
    let start_time = Instant::now();
    let mut ticks: u32 = 0;

    while !cancel.is_cancelled() {
        frame.fill(0);
        hooks.on_captured(&mut frame);
        stats.frames_captured.fetch_add(1, Ordering::Relaxed);

        hooks.on_to_render(&silence);
        stats.frames_rendered.fetch_add(1, Ordering::Relaxed);

        if let Some(writer) = capture.as_mut() {
            let written = frame.iter().try_for_each(|&s| writer.write_sample(s));
            if let Err(e) = written {
                error!("Error while writing capture file, disabling it: {:?}", e);
                capture = None;
            }
        }

        // Schedule against the start time so sleep jitter doesn't accumulate
        ticks += 1;
        let next_tick = start_time + frame_period * ticks;
        let now = Instant::now();
        if next_tick > now && !sleep_unless_cancelled(&cancel, next_tick - now) {
            break;
        }
    }

    if let Some(writer) = capture {
        if let Err(e) = writer.finalize() {
            error!("Error while finalizing capture file: {:?}", e);
        }
    }

    debug!("Simulated audio thread exiting");
}
