use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

const CONFIG_FILE: &str = "Config.toml";

/// Overrides applied on top of the server config that comes with the call
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineTuning {
    pub audio_max_bitrate: u32,
    pub audio_init_bitrate: u32,
    pub audio_min_bitrate: u32,
    pub audio_congestion_window: u32,

    /// Voice processing only makes sense for a live microphone, the call
    /// plays pre-recorded files so all three are off by default
    pub enable_ns: bool,
    pub enable_aec: bool,
    pub enable_agc: bool,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            audio_max_bitrate: 100_000,
            audio_init_bitrate: 100_000,
            audio_min_bitrate: 10_000,
            audio_congestion_window: 4 * 1024,
            enable_ns: false,
            enable_aec: false,
            enable_agc: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    /// How long the simulated engine takes to connect
    pub connect_delay_ms: u64,

    /// Where to record what the call sends, if anywhere
    pub capture_wav: Option<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: 500,
            capture_wav: Some("capture.wav".to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Call object (JSON) to attach to
    pub call_file: Option<String>,

    /// Files queued for playback as soon as the call is created
    pub play: Vec<String>,

    /// Initial hold list
    pub hold: Vec<String>,

    pub engine: EngineTuning,
    pub simulator: SimulatorConfig,
}

pub fn parse(config: &str) -> Result<Config> {
    let config: Config = toml::from_str(config).context("Invalid configuration")?;

    Ok(config)
}

pub async fn load() -> Result<Config> {
    let config = read_to_string(CONFIG_FILE)
        .await
        .with_context(|| format!("Could not read {CONFIG_FILE}"))?;

    parse(&config)
}
