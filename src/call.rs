//! Call lifecycle.
//!
//! A [Call] owns the call record, the sample source and the engine. The
//! engine reports connection state changes through [EngineHooks]; the call
//! opens the sample source once established and tears everything down when
//! the call fails or is hung up.

use crate::{
    config::EngineTuning,
    engine::{EngineConfig, EngineHooks, VoiceEngine},
    event::{Event, EventBus},
    lock::PoisonlessLock,
    record::CallRecord,
    signaling::SignalingAction,
    source::{SampleSource, SourceSnapshot},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::{Arc, Mutex, Weak},
    time::Instant,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum CallState {
    Connecting,
    Established,
    Failed,
    Ended,
}

impl CallState {
    /// Failed and Ended are absorbing, nothing leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Failed | CallState::Ended)
    }

    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;

        matches!(
            (self, next),
            (Connecting, Established)
                | (Connecting, Failed)
                | (Connecting, Ended)
                | (Established, Failed)
                | (Established, Ended)
        )
    }
}

/// What to do with the play queue, as passed in by the script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayRequest {
    File(String),
    Files(Vec<String>),

    /// Stops the current queue item and empties the queue
    Clear,

    /// Clears, then queues the inner request
    ClearThen(Box<PlayRequest>),
}

pub(crate) struct Lifecycle {
    state: CallState,
    established_at: Option<Instant>,
    engine: Option<Box<dyn VoiceEngine>>,
    torn_down: bool,
}

/// What a teardown has to release and report, taken out in one step.
pub(crate) struct Teardown {
    pub engine: Option<Box<dyn VoiceEngine>>,
    pub is_disconnected: bool,
    pub duration: u64,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: CallState::Connecting,
            established_at: None,
            engine: None,
            torn_down: false,
        }
    }

    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    /// Moves to `next` if the state machine allows it.
    pub(crate) fn transition(&mut self, next: CallState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }

        self.state = next;
        if next == CallState::Established {
            self.established_at = Some(Instant::now());
        }
        true
    }

    /// Marks the call torn down, `None` if it already was. A call that isn't
    /// over yet ends as a local hang-up, otherwise the terminal state that is
    /// already committed decides whether the connection dropped.
    pub(crate) fn begin_teardown(&mut self) -> Option<Teardown> {
        if self.torn_down {
            return None;
        }
        self.torn_down = true;

        if !self.state.is_terminal() {
            self.state = CallState::Ended;
        }

        Some(Teardown {
            engine: self.engine.take(),
            is_disconnected: self.state == CallState::Failed,
            duration: self
                .established_at
                .map(|t| t.elapsed().as_secs())
                .unwrap_or_default(),
        })
    }
}

pub struct Call {
    record: CallRecord,
    source: SampleSource,
    lifecycle: Mutex<Lifecycle>,
    bus: EventBus,
}

/// Hooks handed to the engine. They only hold a weak reference, so the
/// engine never keeps a dropped call alive and late callbacks do nothing.
struct CallHooks {
    call: Weak<Call>,
}

impl EngineHooks for CallHooks {
    fn on_captured(&self, buf: &mut [i16]) {
        if let Some(call) = self.call.upgrade() {
            call.source.fill_buffer(buf);
        }
    }

    fn on_to_render(&self, _buf: &[i16]) {
        // Incoming audio is not used
    }

    fn on_state_changed(&self, state: CallState) {
        if let Some(call) = self.call.upgrade() {
            call.handle_state_change(state);
        }
    }
}

impl Call {
    /// Builds the call and starts connecting it through `engine`.
    pub fn create(
        record: CallRecord,
        tuning: &EngineTuning,
        mut engine: Box<dyn VoiceEngine>,
        bus: EventBus,
    ) -> Arc<Call> {
        let config = EngineConfig::from_record(&record, tuning);

        let call = Arc::new(Call {
            record,
            source: SampleSource::new(),
            lifecycle: Mutex::new(Lifecycle::new()),
            bus,
        });

        info!(
            "Creating call {} ({}, {} endpoints)",
            call.record.id,
            if call.record.is_outgoing {
                "outgoing"
            } else {
                "incoming"
            },
            call.record.endpoints.len()
        );

        let hooks: Arc<dyn EngineHooks> = Arc::new(CallHooks {
            call: Arc::downgrade(&call),
        });
        engine.start(config, hooks);

        // The engine may already have failed from inside start()
        let late_engine = {
            let mut lifecycle = call.lifecycle.plock();
            if lifecycle.torn_down {
                Some(engine)
            } else {
                lifecycle.engine = Some(engine);
                None
            }
        };
        if let Some(mut engine) = late_engine {
            engine.stop();
        }

        call
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn record(&self) -> &CallRecord {
        &self.record
    }

    pub fn state(&self) -> CallState {
        self.lifecycle.plock().state
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    /// Applies a state reported by the engine.
    pub fn handle_state_change(&self, next: CallState) {
        {
            let mut lifecycle = self.lifecycle.plock();
            let current = lifecycle.state();

            if !lifecycle.transition(next) {
                if current != next {
                    warn!(
                        "Call {}: ignoring transition {:?} -> {:?}",
                        self.record.id, current, next
                    );
                }
                return;
            }
        }

        info!("Call {} is now {:?}", self.record.id, next);

        match next {
            CallState::Established => self.source.set_established(true),
            CallState::Failed | CallState::Ended => self.teardown(),
            CallState::Connecting => {}
        }
    }

    /// Ends the call from our side.
    pub fn hangup(&self) {
        if self.state().is_terminal() {
            debug!("Call {} is already over", self.record.id);
        } else {
            self.handle_state_change(CallState::Ended);
        }
        self.teardown();
    }

    /// Releases the source and the engine and tells signaling the call is
    /// over. Only the first call does anything.
    fn teardown(&self) {
        let Some(Teardown {
            engine,
            is_disconnected,
            duration,
        }) = self.lifecycle.plock().begin_teardown()
        else {
            return;
        };

        self.source.shutdown();

        let connection_id = match engine {
            Some(mut engine) => {
                let relay_id = engine.preferred_relay_id();
                engine.stop();
                relay_id
            }
            None => 0,
        };

        info!(
            "Call {} torn down after {duration}s (disconnected: {is_disconnected})",
            self.record.id
        );

        self.bus.send(Event::Signaling(SignalingAction::DiscardCall {
            call_id: self.record.id,
            is_disconnected,
            connection_id,
            duration,
        }));
    }

    /// Changes the play queue. Returns how many files were queued.
    pub fn play(&self, request: PlayRequest) -> usize {
        match request {
            PlayRequest::File(path) => match self.source.enqueue_play(&path) {
                Ok(()) => 1,
                Err(e) => {
                    warn!("Call {}: {e:#}", self.record.id);
                    0
                }
            },
            PlayRequest::Files(paths) => self.source.enqueue_play_many(paths),
            PlayRequest::Clear => {
                self.source.stop_all();
                0
            }
            PlayRequest::ClearThen(request) => {
                self.source.stop_all();
                self.play(*request)
            }
        }
    }

    /// Replaces the hold list.
    pub fn on_hold<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.source.set_hold_list(paths);
    }

    /// Engine log merged with the playback state.
    pub fn debug(&self) -> serde_json::Value {
        let (state, engine) = {
            let lifecycle = self.lifecycle.plock();
            let engine = lifecycle
                .engine
                .as_ref()
                .map(|engine| engine.debug_log())
                .unwrap_or(serde_json::Value::Null);
            (lifecycle.state(), engine)
        };
        let playback: SourceSnapshot = self.source.snapshot();

        serde_json::json!({
            "call_id": self.record.id,
            "record": self.record(),
            "state": state,
            "engine": engine,
            "playback": playback,
        })
    }

    /// One-line summary for logs.
    pub fn describe(&self) -> String {
        let snapshot = self.source.snapshot();
        format!(
            "call {} {:?}, playing: {}, queue: [{}], hold: [{}]",
            self.record.id,
            self.state(),
            snapshot.playing,
            snapshot.queue.iter().join(", "),
            snapshot.hold.iter().join(", ")
        )
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.teardown();
    }
}
