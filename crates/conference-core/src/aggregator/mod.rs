//! Per-device call aggregator
//!
//! A [`CallAggregator`] owns every call a single device reports. Status
//! parsers feed it through [`CallAggregator::on_status_fragment`]; it keeps
//! one [`ParticipantState`] per call id, separates unanswered incoming calls
//! from active participants, joins new calls with a held call, and mirrors
//! the device-wide privacy mute, do-not-disturb and auto-answer settings.
//!
//! Commands are fire-and-forget. `answer`, `hold` and friends only emit a
//! [`DeviceCommand`]; local state changes when the device reports back.
//!
//! Locking: `calls`, `toggles`, `incoming_timers` and `handlers` are never
//! held at the same time, and none of them is held while commands are sent
//! or event handlers run.

pub mod events;
pub mod profile;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandSink, DeviceCommand};
use crate::config::AggregatorConfig;
use crate::errors::{ConferenceError, Result};
use crate::participant::{NameCache, ParticipantState, ParticipantUpdate};
use crate::types::{AnswerState, CallId, CallType, DialContext, DialProtocol, ParticipantStatus};

pub use events::{CallEvent, CallEventHandler, IncomingCall};
pub use profile::ProviderProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// Unanswered incoming call
    Incoming,
    /// Participant in the device's conference
    Active,
    /// Incoming call that was ignored; tracked until it disconnects
    Dismissed,
}

#[derive(Debug, Clone)]
struct CallEntry {
    state: ParticipantState,
    kind: CallKind,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DeviceToggles {
    privacy_muted: bool,
    do_not_disturb: bool,
    auto_answer: bool,
}

/// Side effects collected under the call lock and applied after release
#[derive(Default)]
struct Outcome {
    events: Vec<CallEvent>,
    commands: Vec<DeviceCommand>,
    start_timers: Vec<CallId>,
    cancel_timers: Vec<CallId>,
}

fn classify(state: &ParticipantState) -> CallKind {
    if !state.is_incoming() {
        return CallKind::Active;
    }
    match state.answer_state() {
        AnswerState::Ignored => CallKind::Dismissed,
        AnswerState::Answered | AnswerState::AutoAnswered => CallKind::Active,
        AnswerState::Unknown | AnswerState::Unanswered => {
            if state.status().is_connected() || state.status() == ParticipantStatus::OnHold {
                CallKind::Active
            } else {
                CallKind::Incoming
            }
        }
    }
}

/// Tracks the calls of one conferencing device
pub struct CallAggregator {
    profile: ProviderProfile,
    config: AggregatorConfig,
    sink: Arc<dyn CommandSink>,
    names: Arc<NameCache>,
    calls: Mutex<HashMap<CallId, CallEntry>>,
    toggles: Mutex<DeviceToggles>,
    incoming_timers: Mutex<HashMap<CallId, JoinHandle<()>>>,
    handlers: RwLock<Vec<(String, Arc<dyn CallEventHandler>)>>,
    runtime: Option<Handle>,
    weak_self: Weak<CallAggregator>,
}

impl CallAggregator {
    /// Create an aggregator.
    ///
    /// If called inside a tokio runtime, that runtime drives the incoming
    /// call auto-reject timer; otherwise the timer is disabled.
    pub fn new(
        profile: ProviderProfile,
        config: AggregatorConfig,
        sink: Arc<dyn CommandSink>,
        names: Arc<NameCache>,
    ) -> Arc<Self> {
        Self::with_runtime(profile, config, sink, names, Handle::try_current().ok())
    }

    pub fn with_runtime(
        profile: ProviderProfile,
        config: AggregatorConfig,
        sink: Arc<dyn CommandSink>,
        names: Arc<NameCache>,
        runtime: Option<Handle>,
    ) -> Arc<Self> {
        if runtime.is_none() && config.incoming_call_timeout().is_some() {
            debug!("[{}] No tokio runtime; incoming call timeout disabled", profile.name);
        }
        Arc::new_cyclic(|weak_self| Self {
            profile,
            config,
            sink,
            names,
            calls: Mutex::new(HashMap::new()),
            toggles: Mutex::new(DeviceToggles::default()),
            incoming_timers: Mutex::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            runtime,
            weak_self: weak_self.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    // ========== Event handlers ==========

    /// Add an event handler with a unique name
    pub fn add_event_handler(&self, name: &str, handler: Arc<dyn CallEventHandler>) {
        self.handlers.write().push((name.to_string(), handler));
    }

    /// Remove an event handler by name
    pub fn remove_event_handler(&self, name: &str) -> bool {
        let mut handlers = self.handlers.write();
        if let Some(pos) = handlers.iter().position(|(n, _)| n == name) {
            handlers.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn event_handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn publish(&self, events: Vec<CallEvent>) {
        if events.is_empty() {
            return;
        }
        let handlers: Vec<Arc<dyn CallEventHandler>> =
            self.handlers.read().iter().map(|(_, handler)| handler.clone()).collect();
        for event in &events {
            for handler in &handlers {
                handler.handle_call_event(event);
            }
        }
    }

    // ========== Inbound status ==========

    /// Apply one parsed call fragment from the device
    pub fn on_status_fragment(&self, call_id: CallId, update: &ParticipantUpdate) {
        let mut outcome = Outcome::default();
        {
            let mut calls = self.calls.lock();
            if calls.contains_key(&call_id) {
                self.update_call(&mut calls, call_id, update, &mut outcome);
            } else {
                self.add_call(&mut calls, call_id, update, &mut outcome);
            }
        }
        self.finish(outcome);
    }

    fn add_call(
        &self,
        calls: &mut HashMap<CallId, CallEntry>,
        call_id: CallId,
        update: &ParticipantUpdate,
        outcome: &mut Outcome,
    ) {
        if let Some(status) = update.reported_status().filter(|s| s.is_terminal()) {
            debug!("[{}] Ignoring {} for unknown call {}", self.name(), status, call_id);
            return;
        }
        if update.is_empty() {
            debug!("[{}] Ignoring empty fragment for unknown call {}", self.name(), call_id);
            return;
        }

        let now = Utc::now();
        let mut state = ParticipantState::new(call_id);
        state.apply_update(update, &self.names);
        let kind = classify(&state);

        match kind {
            CallKind::Incoming => {
                info!(
                    "[{}] Incoming call {} from {}",
                    self.name(),
                    call_id,
                    state.number().unwrap_or("unknown number")
                );
                outcome.events.push(CallEvent::IncomingCallAdded(IncomingCall::from_state(&state, now)));
                outcome.start_timers.push(call_id);
            }
            CallKind::Active => {
                debug!("[{}] Call {} added ({})", self.name(), call_id, state.status());
                if let Some(held) = self.join_target(calls, call_id) {
                    outcome.commands.push(DeviceCommand::Join {
                        call_id: held,
                        other_call_id: call_id,
                    });
                }
                outcome.events.push(CallEvent::ParticipantAdded(state.clone()));
            }
            CallKind::Dismissed => {
                debug!("[{}] Call {} arrived already ignored", self.name(), call_id);
            }
        }

        calls.insert(
            call_id,
            CallEntry {
                state,
                kind,
                received_at: now,
            },
        );
    }

    fn update_call(
        &self,
        calls: &mut HashMap<CallId, CallEntry>,
        call_id: CallId,
        update: &ParticipantUpdate,
        outcome: &mut Outcome,
    ) {
        let Some(entry) = calls.get_mut(&call_id) else {
            return;
        };
        let changes = entry.state.apply_update(update, &self.names);
        if changes.is_empty() {
            return;
        }

        let state = entry.state.clone();
        let previous_kind = entry.kind;
        let received_at = entry.received_at;
        let terminal = state.status().is_terminal();
        let kind = classify(&state);

        if terminal {
            calls.remove(&call_id);
            match previous_kind {
                CallKind::Incoming => {
                    info!("[{}] Incoming call {} ended unanswered", self.name(), call_id);
                    outcome.cancel_timers.push(call_id);
                    outcome
                        .events
                        .push(CallEvent::IncomingCallRemoved(IncomingCall::from_state(&state, received_at)));
                }
                CallKind::Active => {
                    debug!("[{}] Call {} removed ({})", self.name(), call_id, state.status());
                    outcome.events.push(CallEvent::ParticipantUpdated {
                        participant: state.clone(),
                        changes,
                    });
                    outcome.events.push(CallEvent::ParticipantRemoved(state));
                }
                CallKind::Dismissed => {}
            }
            return;
        }

        match (previous_kind, kind) {
            (CallKind::Incoming, CallKind::Incoming) => {}
            (CallKind::Incoming, CallKind::Active) => {
                entry.kind = CallKind::Active;
                info!("[{}] Incoming call {} answered", self.name(), call_id);
                outcome.cancel_timers.push(call_id);
                outcome
                    .events
                    .push(CallEvent::IncomingCallRemoved(IncomingCall::from_state(&state, received_at)));
                if let Some(held) = self.join_target(calls, call_id) {
                    outcome.commands.push(DeviceCommand::Join {
                        call_id: held,
                        other_call_id: call_id,
                    });
                }
                outcome.events.push(CallEvent::ParticipantAdded(state));
            }
            (CallKind::Incoming, CallKind::Dismissed) => {
                entry.kind = CallKind::Dismissed;
                info!("[{}] Incoming call {} ignored", self.name(), call_id);
                outcome.cancel_timers.push(call_id);
                outcome
                    .events
                    .push(CallEvent::IncomingCallRemoved(IncomingCall::from_state(&state, received_at)));
            }
            (CallKind::Active, _) => {
                outcome.events.push(CallEvent::ParticipantUpdated {
                    participant: state,
                    changes,
                });
            }
            (CallKind::Dismissed, _) => {}
        }
    }

    /// The held call a new call should be joined with, if any
    fn join_target(&self, calls: &HashMap<CallId, CallEntry>, new_call: CallId) -> Option<CallId> {
        if !self.config.auto_join_held_calls || !self.profile.supports_join {
            return None;
        }
        calls
            .values()
            .filter(|entry| {
                entry.kind == CallKind::Active
                    && entry.state.call_id() != new_call
                    && entry.state.status() == ParticipantStatus::OnHold
            })
            .map(|entry| entry.state.call_id())
            .min()
    }

    /// Reconcile against a full status snapshot listing every call the
    /// device still knows. Calls missing from it are orphaned and removed.
    pub fn on_call_snapshot(&self, reported: &[CallId]) {
        let missing: Vec<CallId> = self
            .calls
            .lock()
            .keys()
            .filter(|id| !reported.contains(id))
            .copied()
            .collect();
        self.orphan_calls(&missing);
    }

    /// The device connection was lost; every call is orphaned
    pub fn on_device_offline(&self) {
        let all: Vec<CallId> = self.calls.lock().keys().copied().collect();
        self.orphan_calls(&all);
    }

    fn orphan_calls(&self, call_ids: &[CallId]) {
        if call_ids.is_empty() {
            return;
        }
        let mut outcome = Outcome::default();
        {
            let mut calls = self.calls.lock();
            for call_id in call_ids {
                let Some(mut entry) = calls.remove(call_id) else {
                    continue;
                };
                warn!(
                    "[{}] Call {} vanished from device status without a disconnect",
                    self.name(),
                    call_id
                );
                let changes = entry.state.mark_orphaned();
                match entry.kind {
                    CallKind::Incoming => {
                        outcome.cancel_timers.push(*call_id);
                        outcome.events.push(CallEvent::IncomingCallRemoved(IncomingCall::from_state(
                            &entry.state,
                            entry.received_at,
                        )));
                    }
                    CallKind::Active => {
                        outcome.events.push(CallEvent::ParticipantUpdated {
                            participant: entry.state.clone(),
                            changes,
                        });
                        outcome.events.push(CallEvent::ParticipantRemoved(entry.state));
                    }
                    CallKind::Dismissed => {}
                }
            }
        }
        self.finish(outcome);
    }

    fn finish(&self, outcome: Outcome) {
        for call_id in outcome.cancel_timers {
            self.cancel_incoming_timer(call_id);
        }
        for command in outcome.commands {
            self.issue(command);
        }
        for call_id in outcome.start_timers {
            self.start_incoming_timer(call_id);
        }
        self.publish(outcome.events);
    }

    // ========== Device-wide toggles ==========

    pub fn privacy_muted(&self) -> bool {
        self.toggles.lock().privacy_muted
    }

    pub fn do_not_disturb(&self) -> bool {
        self.toggles.lock().do_not_disturb
    }

    pub fn auto_answer(&self) -> bool {
        self.toggles.lock().auto_answer
    }

    /// Device reported its microphone mute state
    pub fn on_privacy_mute_status(&self, muted: bool) {
        if self.update_toggle(|t| &mut t.privacy_muted, muted) {
            debug!("[{}] Privacy mute is now {}", self.name(), muted);
            self.publish(vec![CallEvent::PrivacyMuteChanged(muted)]);
        }
    }

    /// Device reported its do-not-disturb state
    pub fn on_do_not_disturb_status(&self, enabled: bool) {
        if self.update_toggle(|t| &mut t.do_not_disturb, enabled) {
            debug!("[{}] Do not disturb is now {}", self.name(), enabled);
            self.publish(vec![CallEvent::DoNotDisturbChanged(enabled)]);
        }
    }

    /// Device reported its auto-answer setting
    pub fn on_auto_answer_status(&self, enabled: bool) {
        if self.update_toggle(|t| &mut t.auto_answer, enabled) {
            debug!("[{}] Auto answer is now {}", self.name(), enabled);
            self.publish(vec![CallEvent::AutoAnswerChanged(enabled)]);
        }
    }

    fn update_toggle(&self, field: impl FnOnce(&mut DeviceToggles) -> &mut bool, value: bool) -> bool {
        let mut toggles = self.toggles.lock();
        let slot = field(&mut toggles);
        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }

    // The setters only ask the device; the cached value follows its status.
    // A device that never reports a setting keeps the last value asked for.

    pub fn set_privacy_mute(&self, enabled: bool) {
        self.issue(DeviceCommand::SetPrivacyMute { enabled });
    }

    pub fn set_do_not_disturb(&self, enabled: bool) {
        self.issue(DeviceCommand::SetDoNotDisturb { enabled });
        if !self.profile.reports_do_not_disturb {
            self.update_toggle(|t| &mut t.do_not_disturb, enabled);
        }
    }

    pub fn set_auto_answer(&self, enabled: bool) {
        self.issue(DeviceCommand::SetAutoAnswer { enabled });
        if !self.profile.reports_auto_answer {
            self.update_toggle(|t| &mut t.auto_answer, enabled);
        }
    }

    // ========== Call commands ==========

    /// Dial a number. Online calls are put on hold first.
    ///
    /// An unknown call type or empty number is a caller error.
    pub fn dial(&self, number: &str, protocol: DialProtocol, call_type: CallType) -> Result<()> {
        self.dial_context(
            &DialContext::new(number)
                .with_protocol(protocol)
                .with_call_type(call_type),
        )
    }

    pub fn dial_context(&self, context: &DialContext) -> Result<()> {
        if context.call_type == CallType::Unknown {
            return Err(ConferenceError::invalid_argument(format!(
                "cannot dial {} with an unknown call type",
                context.dial_string
            )));
        }
        if context.dial_string.trim().is_empty() {
            return Err(ConferenceError::invalid_argument("cannot dial an empty number"));
        }

        let protocol = match context.protocol {
            DialProtocol::Unknown => self.profile.default_protocol,
            protocol => protocol,
        };

        if self.profile.supports_hold {
            let to_hold: Vec<CallId> = {
                let calls = self.calls.lock();
                let mut ids: Vec<CallId> = calls
                    .values()
                    .filter(|entry| {
                        entry.kind == CallKind::Active
                            && entry.state.is_online()
                            && !matches!(
                                entry.state.status(),
                                ParticipantStatus::OnHold | ParticipantStatus::Disconnecting
                            )
                    })
                    .map(|entry| entry.state.call_id())
                    .collect();
                ids.sort();
                ids
            };
            for call_id in to_hold {
                debug!("[{}] Holding call {} before dialing", self.name(), call_id);
                self.issue(DeviceCommand::Hold { call_id });
            }
        }

        info!("[{}] Dialing {} ({}, {})", self.name(), context.dial_string, protocol, context.call_type);
        self.issue(DeviceCommand::Dial {
            number: context.dial_string.trim().to_string(),
            protocol,
            call_type: context.call_type,
            password: context.password.clone(),
        });
        Ok(())
    }

    pub fn answer(&self, call_id: CallId) {
        if self.command_for_call(call_id, "answer", DeviceCommand::Accept { call_id }) {
            self.cancel_incoming_timer(call_id);
        }
    }

    pub fn reject(&self, call_id: CallId) {
        if self.command_for_call(call_id, "reject", DeviceCommand::Reject { call_id }) {
            self.cancel_incoming_timer(call_id);
        }
    }

    pub fn hold(&self, call_id: CallId) {
        self.command_for_call(call_id, "hold", DeviceCommand::Hold { call_id });
    }

    pub fn resume(&self, call_id: CallId) {
        self.command_for_call(call_id, "resume", DeviceCommand::Resume { call_id });
    }

    pub fn hangup(&self, call_id: CallId) {
        self.command_for_call(call_id, "hang up", DeviceCommand::Disconnect { call_id });
    }

    pub fn join(&self, call_id: CallId, other_call_id: CallId) {
        if call_id == other_call_id {
            warn!("[{}] Cannot join call {} with itself", self.name(), call_id);
            return;
        }
        if !self.has_call(other_call_id) {
            warn!("[{}] Cannot join unknown call {}", self.name(), other_call_id);
            return;
        }
        self.command_for_call(call_id, "join", DeviceCommand::Join { call_id, other_call_id });
    }

    pub fn send_dtmf(&self, call_id: CallId, digits: &str) {
        if digits.is_empty() {
            warn!("[{}] Ignoring empty DTMF for call {}", self.name(), call_id);
            return;
        }
        self.command_for_call(
            call_id,
            "send DTMF to",
            DeviceCommand::SendDtmf {
                call_id,
                digits: digits.to_string(),
            },
        );
    }

    /// Disconnect every active participant
    pub fn hangup_all(&self) {
        let mut ids: Vec<CallId> = self
            .calls
            .lock()
            .values()
            .filter(|entry| entry.kind == CallKind::Active && entry.state.is_online())
            .map(|entry| entry.state.call_id())
            .collect();
        ids.sort();
        for call_id in ids {
            self.issue(DeviceCommand::Disconnect { call_id });
        }
    }

    /// Issue a command for a known call; unknown calls are a logged no-op
    fn command_for_call(&self, call_id: CallId, action: &str, command: DeviceCommand) -> bool {
        if let Err(e) = self.known_call(call_id) {
            warn!("[{}] Cannot {}: {}", self.name(), action, e);
            return false;
        }
        self.issue(command);
        true
    }

    fn known_call(&self, call_id: CallId) -> Result<()> {
        if self.has_call(call_id) {
            Ok(())
        } else {
            Err(ConferenceError::CallNotFound(call_id))
        }
    }

    fn issue(&self, command: DeviceCommand) {
        debug!("[{}] Sending command: {}", self.name(), command);
        if let Err(e) = self.sink.send_command(command) {
            error!("[{}] Failed to send command: {}", self.name(), e);
        }
    }

    // ========== Incoming call timeout ==========

    fn start_incoming_timer(&self, call_id: CallId) {
        let Some(timeout) = self.config.incoming_call_timeout() else {
            return;
        };
        let Some(runtime) = &self.runtime else {
            return;
        };

        let weak = self.weak_self.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(aggregator) = weak.upgrade() {
                aggregator.expire_incoming_call(call_id);
            }
        });

        if let Some(previous) = self.incoming_timers.lock().insert(call_id, task) {
            previous.abort();
        }
    }

    fn cancel_incoming_timer(&self, call_id: CallId) {
        if let Some(task) = self.incoming_timers.lock().remove(&call_id) {
            task.abort();
        }
    }

    fn expire_incoming_call(&self, call_id: CallId) {
        self.incoming_timers.lock().remove(&call_id);
        let pending = matches!(
            self.calls.lock().get(&call_id).map(|entry| entry.kind),
            Some(CallKind::Incoming)
        );
        if pending {
            warn!("[{}] Incoming call {} timed out, rejecting", self.name(), call_id);
            self.issue(DeviceCommand::Reject { call_id });
        }
    }

    pub fn pending_timer_count(&self) -> usize {
        self.incoming_timers.lock().len()
    }

    // ========== Queries ==========

    pub fn has_call(&self, call_id: CallId) -> bool {
        self.calls.lock().contains_key(&call_id)
    }

    /// Any tracked call, including unanswered incoming ones
    pub fn call(&self, call_id: CallId) -> Option<ParticipantState> {
        self.calls.lock().get(&call_id).map(|entry| entry.state.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Active participants ordered by call id
    pub fn participants(&self) -> Vec<ParticipantState> {
        let mut participants: Vec<ParticipantState> = self
            .calls
            .lock()
            .values()
            .filter(|entry| entry.kind == CallKind::Active)
            .map(|entry| entry.state.clone())
            .collect();
        participants.sort_by_key(|p| p.call_id());
        participants
    }

    pub fn online_participants(&self) -> Vec<ParticipantState> {
        self.participants().into_iter().filter(|p| p.is_online()).collect()
    }

    /// Unanswered incoming calls ordered by call id
    pub fn incoming_calls(&self) -> Vec<IncomingCall> {
        let mut incoming: Vec<IncomingCall> = self
            .calls
            .lock()
            .values()
            .filter(|entry| entry.kind == CallKind::Incoming)
            .map(|entry| IncomingCall::from_state(&entry.state, entry.received_at))
            .collect();
        incoming.sort_by_key(|call| call.call_id);
        incoming
    }
}

impl Drop for CallAggregator {
    fn drop(&mut self) {
        for (_, task) in self.incoming_timers.get_mut().drain() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CallAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAggregator")
            .field("name", &self.profile.name)
            .field("calls", &self.call_count())
            .finish()
    }
}
