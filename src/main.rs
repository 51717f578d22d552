use anyhow::{anyhow, Context, Result};
use std::env;
use tdvoip_rs::{
    call::{Call, PlayRequest},
    config::{self, Config},
    engine::sim::SimEngine,
    event::{self, Event},
    record::CallRecord,
    script, signaling, stdin,
};

#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            warn!("{e:#}, using defaults");
            Config::default()
        }
    };

    let call_file = env::args()
        .nth(1)
        .or_else(|| config.call_file.clone())
        .ok_or_else(|| anyhow!("No call file given (argument or call_file in Config.toml)"))?;
    let call_json = tokio::fs::read_to_string(&call_file)
        .await
        .with_context(|| format!("Could not read {call_file}"))?;
    let record = CallRecord::parse(&call_json)?;

    let bus = event::EventBus::new();
    event::debug(&bus);
    signaling::init(&bus);
    let mut subscriber = bus.subscribe();

    let engine = Box::new(SimEngine::new(config.simulator.clone()));
    let call = Call::create(record, &config.engine, engine, bus.clone());

    if !config.hold.is_empty() {
        call.on_hold(&config.hold);
    }
    if !config.play.is_empty() {
        call.play(PlayRequest::Files(config.play.clone()));
    }

    script::init(&bus, call.clone());
    stdin::init(&bus);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, hanging up");
                call.hangup();
            }
            event = subscriber.recv() => {
                if let Event::Signaling(action) = event {
                    debug!("Call finished: {:?}", action);
                    break;
                }
            }
        }
    }

    info!("{}", call.describe());

    Ok(())
}
