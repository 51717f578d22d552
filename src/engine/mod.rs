//! Boundary towards the network voice engine.
//!
//! The engine itself is opaque: it gets an [EngineConfig] derived from the
//! call record, and talks back through [EngineHooks].

pub mod sim;

use crate::{
    call::CallState,
    config::EngineTuning,
    record::{CallRecord, Endpoint},
};
use serde::Serialize;
use std::sync::Arc;

/// Everything the engine needs to connect a call.
#[derive(Clone, Debug, Serialize)]
pub struct EngineConfig {
    pub call_id: i64,

    /// All endpoints are UDP relays
    pub endpoints: Vec<Endpoint>,

    #[serde(skip_serializing)]
    pub encryption_key: Vec<u8>,
    pub is_outgoing: bool,
    pub allow_p2p: bool,
    pub max_layer: i32,
    pub enable_ns: bool,
    pub enable_aec: bool,
    pub enable_agc: bool,

    /// Server config with the bitrate overrides applied
    pub server_config: serde_json::Value,
}

impl EngineConfig {
    pub fn from_record(record: &CallRecord, tuning: &EngineTuning) -> Self {
        let mut server_config = record.server_config.clone();
        if !server_config.is_object() {
            server_config = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = server_config.as_object_mut() {
            map.insert("audio_max_bitrate".into(), tuning.audio_max_bitrate.into());
            map.insert("audio_init_bitrate".into(), tuning.audio_init_bitrate.into());
            map.insert("audio_min_bitrate".into(), tuning.audio_min_bitrate.into());
            map.insert(
                "audio_congestion_window".into(),
                tuning.audio_congestion_window.into(),
            );
        }

        EngineConfig {
            call_id: record.id,
            endpoints: record.endpoints.clone(),
            encryption_key: record.encryption_key.clone(),
            is_outgoing: record.is_outgoing,
            allow_p2p: record.protocol.udp_p2p,
            max_layer: record.protocol.max_layer,
            enable_ns: tuning.enable_ns,
            enable_aec: tuning.enable_aec,
            enable_agc: tuning.enable_agc,
            server_config,
        }
    }
}

/// Callbacks the engine invokes while the call runs.
pub trait EngineHooks: Send + Sync {
    /// Asks for the next frame of outgoing audio. Called on the engine's
    /// real-time thread.
    fn on_captured(&self, buf: &mut [i16]);

    /// Hands over a frame of incoming audio.
    fn on_to_render(&self, buf: &[i16]);

    /// Reports a connection state change, from any thread.
    fn on_state_changed(&self, state: CallState);
}

pub trait VoiceEngine: Send {
    fn start(&mut self, config: EngineConfig, hooks: Arc<dyn EngineHooks>);

    /// Tears the connection down. Must not wait for the engine's own
    /// threads, since it may be called from inside a hook.
    fn stop(&mut self);

    fn preferred_relay_id(&self) -> i64;

    fn debug_log(&self) -> serde_json::Value;
}
