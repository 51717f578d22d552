//! Control surface used by scripts (and the console).
//!
//! Every action maps onto exactly one [Call] operation. Actions arrive on
//! the event bus and are applied in order.

use crate::{
    call::{Call, PlayRequest},
    event::{Event, EventBus},
};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallAction {
    /// Queue files, clear the queue, or both
    Play(PlayRequest),

    /// Replace the hold list
    OnHold(Vec<String>),

    /// Log the call's debug state
    Debug,

    /// End the call
    Hangup,
}

pub fn apply(call: &Call, action: CallAction) {
    match action {
        CallAction::Play(request) => {
            let queued = call.play(request);
            debug!("Queued {queued} files for call {}", call.id());
        }
        CallAction::OnHold(paths) => call.on_hold(paths),
        CallAction::Debug => match serde_json::to_string_pretty(&call.debug()) {
            Ok(json) => info!("Debug for call {}:\n{json}", call.id()),
            Err(e) => error!("Error while serializing debug output: {:?}", e),
        },
        CallAction::Hangup => call.hangup(),
    }
}

pub fn init(bus: &EventBus, call: Arc<Call>) {
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut bus = bus.subscribe();

        loop {
            if let Event::Call(action) = bus.recv().await {
                // Queueing opens files to check them, keep that off the runtime
                let call = call.clone();
                let result = tokio::task::spawn_blocking(move || apply(&call, action)).await;

                if let Err(e) = result {
                    error!("Error while applying call action: {:?}", e);
                }
            }
        }
    });
}
