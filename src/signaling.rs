use crate::event::{Event, EventBus};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum SignalingAction {
    /// Tells the signaling client the call is over
    DiscardCall {
        call_id: i64,

        /// True when the connection dropped, false for a local hang-up
        is_disconnected: bool,

        /// Relay the engine ended up preferring
        connection_id: i64,

        /// Seconds the call was established for
        duration: u64,
    },
}

impl SignalingAction {
    pub fn to_json(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Error while serializing signaling request: {:?}", e);
                serde_json::Value::Null
            }
        }
    }
}

/// Forwards signaling requests to the client. There is no client in this
/// process, so requests are logged in the form it would receive them.
pub fn init(bus: &EventBus) {
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut bus = bus.subscribe();

        loop {
            if let Event::Signaling(action) = bus.recv().await {
                info!("-> {}", action.to_json());
            }
        }
    });
}
