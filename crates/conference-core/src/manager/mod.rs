//! Conference manager
//!
//! The [`ConferenceManager`] sits above every registered device. It turns
//! the per-device call events into conferences, keeps bounded histories of
//! recent conferences and participants, computes the room's in-call state
//! and keeps the room policy (privacy mute, do-not-disturb, auto-answer) in
//! sync on every device.
//!
//! Devices register as *dialing* providers, keyed by the call types they
//! handle, or as *feedback* providers that mirror policy and report calls
//! but are never asked to dial.
//!
//! Lock order is `state` -> conference -> participant. The provider
//! registry and the policy lock are never held while a provider is called.

pub mod events;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{CallEvent, CallEventHandler, IncomingCall};
use crate::conference::{Conference, ParticipantKey, ProviderKey, SharedParticipant};
use crate::config::ConferenceConfig;
use crate::errors::{ConferenceError, Result};
use crate::history::ScrollQueue;
use crate::participant::{NameCache, ParticipantState};
use crate::provider::DialingProvider;
use crate::types::{CallId, CallType, CallTypes, DialContext, DialingSupport, InCallState};

pub use events::{ConferenceManagerEvent, ManagedIncomingCall};

type SharedConference = Arc<RwLock<Conference>>;

struct ProviderSlot {
    provider: Arc<dyn DialingProvider>,
    /// Number of registrations (dialing masks plus feedback) using this slot
    roles: usize,
}

#[derive(Default)]
struct ProviderRegistry {
    slots: IndexMap<ProviderKey, ProviderSlot>,
    /// Registration order; the first entry is the default provider
    dialing: Vec<(CallTypes, ProviderKey)>,
    feedback: Vec<ProviderKey>,
}

impl ProviderRegistry {
    fn find(&self, provider: &Arc<dyn DialingProvider>) -> Option<ProviderKey> {
        self.slots
            .iter()
            .find(|(_, slot)| std::ptr::addr_eq(Arc::as_ptr(&slot.provider), Arc::as_ptr(provider)))
            .map(|(key, _)| *key)
    }

    /// Returns the slot key and whether the provider is new to the manager
    fn subscribe(&mut self, provider: &Arc<dyn DialingProvider>, next_key: &AtomicU64) -> (ProviderKey, bool) {
        if let Some(key) = self.find(provider) {
            if let Some(slot) = self.slots.get_mut(&key) {
                slot.roles += 1;
            }
            return (key, false);
        }
        let key = ProviderKey(next_key.fetch_add(1, Ordering::Relaxed));
        self.slots.insert(
            key,
            ProviderSlot {
                provider: provider.clone(),
                roles: 1,
            },
        );
        (key, true)
    }

    /// Returns the provider once its last registration is gone
    fn unsubscribe(&mut self, key: ProviderKey) -> Option<Arc<dyn DialingProvider>> {
        let slot = self.slots.get_mut(&key)?;
        slot.roles = slot.roles.saturating_sub(1);
        if slot.roles > 0 {
            return None;
        }
        self.slots.shift_remove(&key).map(|slot| slot.provider)
    }

    fn provider(&self, key: ProviderKey) -> Option<Arc<dyn DialingProvider>> {
        self.slots.get(&key).map(|slot| slot.provider.clone())
    }

    fn all(&self) -> Vec<Arc<dyn DialingProvider>> {
        self.slots.values().map(|slot| slot.provider.clone()).collect()
    }

    fn dialers(&self) -> Vec<Arc<dyn DialingProvider>> {
        self.dialing.iter().filter_map(|(_, key)| self.provider(*key)).collect()
    }

    /// Exact mask first, then any overlapping mask, then the default
    fn dialer_for(&self, call_types: CallTypes) -> Option<Arc<dyn DialingProvider>> {
        let key = self
            .dialing
            .iter()
            .find(|(mask, _)| *mask == call_types)
            .or_else(|| self.dialing.iter().find(|(mask, _)| mask.intersects(call_types)))
            .or_else(|| self.dialing.first())
            .map(|(_, key)| *key)?;
        self.provider(key)
    }
}

#[derive(Clone)]
struct Tracked {
    conference: SharedConference,
    participant: SharedParticipant,
}

struct ManagerState {
    active: Option<SharedConference>,
    tracked: HashMap<ParticipantKey, Tracked>,
    incoming: IndexMap<ParticipantKey, IncomingCall>,
    recent_conferences: ScrollQueue<SharedConference>,
    recent_participants: ScrollQueue<SharedParticipant>,
    in_call: InCallState,
}

#[derive(Debug, Clone, Copy, Default)]
struct RoomPolicy {
    privacy_muted: bool,
    do_not_disturb: bool,
    auto_answer: bool,
}

struct Inner {
    id: Uuid,
    config: ConferenceConfig,
    names: Arc<NameCache>,
    providers: RwLock<ProviderRegistry>,
    state: Mutex<ManagerState>,
    policy: Mutex<RoomPolicy>,
    events: broadcast::Sender<ConferenceManagerEvent>,
    next_key: AtomicU64,
}

/// Routes one provider's call events into the manager
struct ProviderEventHandler {
    manager: Weak<Inner>,
    key: ProviderKey,
}

impl CallEventHandler for ProviderEventHandler {
    fn handle_call_event(&self, event: &CallEvent) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_provider_event(self.key, event);
        }
    }
}

/// Aggregates every registered device into one conference view
#[derive(Clone)]
pub struct ConferenceManager {
    inner: Arc<Inner>,
}

impl ConferenceManager {
    pub fn new(config: ConferenceConfig) -> Self {
        Self::with_name_cache(config, Arc::new(NameCache::new()))
    }

    /// Create a manager sharing an existing name cache
    pub fn with_name_cache(config: ConferenceConfig, names: Arc<NameCache>) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let state = ManagerState {
            active: None,
            tracked: HashMap::new(),
            incoming: IndexMap::new(),
            recent_conferences: ScrollQueue::new(config.history_capacity),
            recent_participants: ScrollQueue::new(config.history_capacity),
            in_call: InCallState::None,
        };
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                names,
                providers: RwLock::new(ProviderRegistry::default()),
                state: Mutex::new(state),
                policy: Mutex::new(RoomPolicy::default()),
                events,
                next_key: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ConferenceConfig {
        &self.inner.config
    }

    /// Name cache to hand to the aggregators of this room
    pub fn name_cache(&self) -> Arc<NameCache> {
        self.inner.names.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConferenceManagerEvent> {
        self.inner.events.subscribe()
    }

    // ========== Provider registration ==========

    /// Register a provider for a set of call types.
    ///
    /// Returns false if another provider already owns exactly this set. The
    /// first provider registered is the default for unmatched dials.
    pub fn register_dialing_provider(&self, call_types: CallTypes, provider: Arc<dyn DialingProvider>) -> bool {
        if call_types.is_empty() {
            warn!("Refusing to register {} for an empty call type set", provider.name());
            return false;
        }
        let (key, fresh) = {
            let mut registry = self.inner.providers.write();
            if registry.dialing.iter().any(|(mask, _)| *mask == call_types) {
                warn!("A dialing provider for {} is already registered", call_types);
                return false;
            }
            let (key, fresh) = registry.subscribe(&provider, &self.inner.next_key);
            registry.dialing.push((call_types, key));
            (key, fresh)
        };
        info!("Registered dialing provider {} ({}) for {}", provider.name(), key, call_types);
        if fresh {
            self.inner.attach(key, provider);
        }
        true
    }

    /// Remove the provider owning exactly this set of call types
    pub fn deregister_dialing_provider(&self, call_types: CallTypes) -> bool {
        let (key, released) = {
            let mut registry = self.inner.providers.write();
            let Some(pos) = registry.dialing.iter().position(|(mask, _)| *mask == call_types) else {
                warn!("No dialing provider registered for {}", call_types);
                return false;
            };
            let (_, key) = registry.dialing.remove(pos);
            (key, registry.unsubscribe(key))
        };
        info!("Deregistered dialing provider {} for {}", key, call_types);
        if let Some(provider) = released {
            self.inner.detach(key, provider);
        }
        true
    }

    /// Register a provider that mirrors policy and reports calls but never dials
    pub fn register_feedback_dialing_provider(&self, provider: Arc<dyn DialingProvider>) -> bool {
        let (key, fresh) = {
            let mut registry = self.inner.providers.write();
            if let Some(existing) = registry.find(&provider) {
                if registry.feedback.contains(&existing) {
                    warn!("Feedback provider {} is already registered", provider.name());
                    return false;
                }
            }
            let (key, fresh) = registry.subscribe(&provider, &self.inner.next_key);
            registry.feedback.push(key);
            (key, fresh)
        };
        info!("Registered feedback provider {} ({})", provider.name(), key);
        if fresh {
            self.inner.attach(key, provider);
        }
        true
    }

    pub fn deregister_feedback_dialing_provider(&self, provider: &Arc<dyn DialingProvider>) -> bool {
        let (key, released) = {
            let mut registry = self.inner.providers.write();
            let Some(key) = registry.find(provider).filter(|key| registry.feedback.contains(key)) else {
                warn!("Feedback provider {} is not registered", provider.name());
                return false;
            };
            registry.feedback.retain(|candidate| *candidate != key);
            (key, registry.unsubscribe(key))
        };
        info!("Deregistered feedback provider {} ({})", provider.name(), key);
        if let Some(provider) = released {
            self.inner.detach(key, provider);
        }
        true
    }

    /// The provider used when no call type mask matches
    pub fn default_dialing_provider(&self) -> Option<Arc<dyn DialingProvider>> {
        let registry = self.inner.providers.read();
        registry.dialing.first().and_then(|(_, key)| registry.provider(*key))
    }

    pub fn dialing_provider(&self, call_types: CallTypes) -> Option<Arc<dyn DialingProvider>> {
        let registry = self.inner.providers.read();
        registry
            .dialing
            .iter()
            .find(|(mask, _)| *mask == call_types)
            .and_then(|(_, key)| registry.provider(*key))
    }

    pub fn dialing_provider_count(&self) -> usize {
        self.inner.providers.read().dialing.len()
    }

    pub fn feedback_provider_count(&self) -> usize {
        self.inner.providers.read().feedback.len()
    }

    // ========== Dialing ==========

    /// Dial through the provider owning the requested call type.
    ///
    /// `CallType::Unknown` resolves to the configured default. The call type
    /// is narrowed to what the chosen provider supports.
    pub fn dial(&self, number: &str, call_type: CallType) -> Result<()> {
        let requested = self.resolve_call_type(call_type);
        let provider = self
            .inner
            .providers
            .read()
            .dialer_for(CallTypes::from(requested))
            .ok_or_else(|| ConferenceError::NoDialingProvider(number.to_string()))?;

        let call_type = narrow_call_type(provider.supported_call_types(), requested);
        info!("Dialing {} as {} through {}", number, call_type, provider.name());
        provider.dial(&DialContext::new(number).with_call_type(call_type))
    }

    /// The dialing provider best suited for a dial request.
    ///
    /// Providers that do not support the requested call type are skipped; ties
    /// go to the provider registered first. Returns `None` when nobody can dial.
    pub fn get_best_dialer(&self, context: &DialContext) -> Option<Arc<dyn DialingProvider>> {
        let requested = CallTypes::from(context.call_type);
        let candidates = self.inner.providers.read().dialers();

        let mut best: Option<(DialingSupport, Arc<dyn DialingProvider>)> = None;
        for provider in candidates {
            if !requested.is_empty() && !provider.supported_call_types().intersects(requested) {
                continue;
            }
            let support = provider.can_dial(context);
            debug!("{} can dial {}: {:?}", provider.name(), context.dial_string, support);
            if support == DialingSupport::Unsupported {
                continue;
            }
            if best.as_ref().is_none_or(|(current, _)| support > *current) {
                best = Some((support, provider));
            }
        }
        best.map(|(_, provider)| provider)
    }

    /// Dial a full context through the best dialer
    pub fn dial_context(&self, context: &DialContext) -> Result<()> {
        let mut context = context.clone();
        context.call_type = self.resolve_call_type(context.call_type);

        let provider = self
            .get_best_dialer(&context)
            .ok_or_else(|| ConferenceError::NoDialingProvider(context.dial_string.clone()))?;
        context.call_type = narrow_call_type(provider.supported_call_types(), context.call_type);
        info!(
            "Dialing {} ({}, {}) through {}",
            context.dial_string,
            context.protocol,
            context.call_type,
            provider.name()
        );
        provider.dial(&context)
    }

    fn resolve_call_type(&self, call_type: CallType) -> CallType {
        match call_type {
            CallType::Unknown => self.inner.config.default_call_type,
            call_type => call_type,
        }
    }

    /// Disconnect every participant on every provider
    pub fn hangup_all(&self) {
        let providers = self.inner.providers.read().all();
        for provider in providers {
            provider.hangup_all();
        }
    }

    // ========== Room policy ==========

    pub fn privacy_muted(&self) -> bool {
        self.inner.policy.lock().privacy_muted
    }

    pub fn do_not_disturb(&self) -> bool {
        self.inner.policy.lock().do_not_disturb
    }

    pub fn auto_answer(&self) -> bool {
        self.inner.policy.lock().auto_answer
    }

    pub fn set_privacy_muted(&self, muted: bool) {
        self.inner.set_privacy_muted(muted);
    }

    pub fn set_do_not_disturb(&self, enabled: bool) {
        self.inner.set_do_not_disturb(enabled);
    }

    pub fn set_auto_answer(&self, enabled: bool) {
        self.inner.set_auto_answer(enabled);
    }

    /// Push the room policy to one provider, once per differing flag
    pub fn update_provider(&self, provider: &dyn DialingProvider) {
        self.inner.update_provider(provider);
    }

    // ========== Conferences ==========

    /// Aggregate in-call state over every online participant
    pub fn in_call(&self) -> InCallState {
        self.inner.state.lock().in_call
    }

    pub fn is_in_call(&self) -> bool {
        self.in_call() != InCallState::None
    }

    /// The current conference, if one is running or being set up
    pub fn active_conference(&self) -> Option<Conference> {
        let state = self.inner.state.lock();
        state.active.as_ref().map(|conference| conference.read().clone())
    }

    /// Conferences, oldest first
    pub fn recent_conferences(&self) -> Vec<Conference> {
        let state = self.inner.state.lock();
        state
            .recent_conferences
            .iter()
            .map(|conference| conference.read().clone())
            .collect()
    }

    /// Participants, oldest first
    pub fn recent_participants(&self) -> Vec<ParticipantState> {
        let state = self.inner.state.lock();
        state
            .recent_participants
            .iter()
            .map(|participant| participant.read().clone())
            .collect()
    }

    pub fn participant(&self, provider: ProviderKey, call_id: CallId) -> Option<ParticipantState> {
        let state = self.inner.state.lock();
        state
            .tracked
            .get(&ParticipantKey::new(provider, call_id))
            .map(|tracked| tracked.participant.read().clone())
    }

    // ========== Incoming calls ==========

    /// Unanswered incoming calls across all providers, in arrival order
    pub fn incoming_calls(&self) -> Vec<ManagedIncomingCall> {
        let calls: Vec<(ParticipantKey, IncomingCall)> = {
            let state = self.inner.state.lock();
            state.incoming.iter().map(|(key, call)| (*key, call.clone())).collect()
        };
        let registry = self.inner.providers.read();
        calls
            .into_iter()
            .map(|(key, call)| ManagedIncomingCall {
                provider: key.provider,
                provider_name: registry
                    .provider(key.provider)
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                call,
            })
            .collect()
    }

    pub fn answer_incoming(&self, provider: ProviderKey, call_id: CallId) -> bool {
        match self.inner.registered(provider) {
            Ok(p) => {
                p.answer(call_id);
                true
            }
            Err(e) => {
                warn!("Cannot answer call {}: {}", call_id, e);
                false
            }
        }
    }

    pub fn reject_incoming(&self, provider: ProviderKey, call_id: CallId) -> bool {
        match self.inner.registered(provider) {
            Ok(p) => {
                p.reject(call_id);
                true
            }
            Err(e) => {
                warn!("Cannot reject call {}: {}", call_id, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for ConferenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConferenceManager")
            .field("id", &self.inner.id)
            .field("dialing_providers", &self.dialing_provider_count())
            .field("feedback_providers", &self.feedback_provider_count())
            .finish()
    }
}

/// Intersection of what the provider supports and what was requested,
/// falling back to everything the provider supports
fn narrow_call_type(supported: CallTypes, requested: CallType) -> CallType {
    let narrowed = supported & CallTypes::from(requested);
    if narrowed.is_empty() {
        supported.best()
    } else {
        narrowed.best()
    }
}

impl Inner {
    fn handler_name(&self, key: ProviderKey) -> String {
        format!("conference-manager:{}:{}", self.id, key)
    }

    fn provider(&self, key: ProviderKey) -> Option<Arc<dyn DialingProvider>> {
        self.providers.read().provider(key)
    }

    fn registered(&self, key: ProviderKey) -> Result<Arc<dyn DialingProvider>> {
        self.provider(key)
            .ok_or_else(|| ConferenceError::ProviderNotFound(key.to_string()))
    }

    fn emit(&self, events: Vec<ConferenceManagerEvent>) {
        for event in events {
            debug!("Conference manager event: {:?}", event);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn attach(self: &Arc<Self>, key: ProviderKey, provider: Arc<dyn DialingProvider>) {
        let handler = Arc::new(ProviderEventHandler {
            manager: Arc::downgrade(self),
            key,
        });
        provider.add_event_handler(&self.handler_name(key), handler);
        self.emit(vec![ConferenceManagerEvent::ProviderRegistered {
            provider: key,
            name: provider.name().to_string(),
        }]);

        self.update_provider(provider.as_ref());

        for participant in provider.participants() {
            self.participant_added(key, &participant);
        }
        for call in provider.incoming_calls() {
            self.incoming_added(key, &call);
        }
    }

    fn detach(&self, key: ProviderKey, provider: Arc<dyn DialingProvider>) {
        provider.remove_event_handler(&self.handler_name(key));

        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let keys: Vec<ParticipantKey> = state.tracked.keys().filter(|k| k.provider == key).copied().collect();
            let mut touched: Vec<SharedConference> = Vec::new();
            for participant_key in keys {
                let Some(tracked) = state.tracked.remove(&participant_key) else {
                    continue;
                };
                let conference_id = {
                    let mut conference = tracked.conference.write();
                    conference.remove_participant(&participant_key);
                    conference.id()
                };
                out.push(ConferenceManagerEvent::ParticipantRemoved {
                    conference: conference_id,
                    key: participant_key,
                    participant: tracked.participant.read().clone(),
                });
                if !touched.iter().any(|c| Arc::ptr_eq(c, &tracked.conference)) {
                    touched.push(tracked.conference);
                }
            }
            for conference in &touched {
                self.refresh_conference(&mut state, conference, &mut out);
            }

            let dropped: Vec<ParticipantKey> = state.incoming.keys().filter(|k| k.provider == key).copied().collect();
            for participant_key in dropped {
                if let Some(call) = state.incoming.shift_remove(&participant_key) {
                    out.push(ConferenceManagerEvent::IncomingCallRemoved { provider: key, call });
                }
            }
            self.refresh_in_call(&mut state, &mut out);
        }
        out.push(ConferenceManagerEvent::ProviderDeregistered {
            provider: key,
            name: provider.name().to_string(),
        });
        self.emit(out);
    }

    fn on_provider_event(&self, key: ProviderKey, event: &CallEvent) {
        match event {
            CallEvent::ParticipantAdded(participant) => self.participant_added(key, participant),
            CallEvent::ParticipantUpdated { participant, .. } => self.participant_changed(key, participant, false),
            CallEvent::ParticipantRemoved(participant) => self.participant_changed(key, participant, true),
            CallEvent::IncomingCallAdded(call) => self.incoming_added(key, call),
            CallEvent::IncomingCallRemoved(call) => self.incoming_removed(key, call),
            CallEvent::PrivacyMuteChanged(muted) => {
                if *muted != self.policy.lock().privacy_muted {
                    info!("Provider {} changed privacy mute to {}, applying to the room", key, muted);
                    self.set_privacy_muted(*muted);
                }
            }
            CallEvent::DoNotDisturbChanged(_) | CallEvent::AutoAnswerChanged(_) => {
                if let Some(provider) = self.provider(key) {
                    self.update_provider(provider.as_ref());
                }
            }
        }
    }

    // ========== Participants ==========

    fn participant_added(&self, provider: ProviderKey, participant: &ParticipantState) {
        let key = ParticipantKey::new(provider, participant.call_id());
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            if state.tracked.contains_key(&key) {
                drop(state);
                self.participant_changed(provider, participant, false);
                return;
            }

            // Only a finished conference clears `active`, so any active one is reused
            let conference = if let Some(conference) = state.active.clone() {
                conference
            } else {
                let conference: SharedConference = Arc::new(RwLock::new(Conference::new()));
                let id = conference.read().id();
                info!("Conference {} created", id);
                state.recent_conferences.enqueue(conference.clone());
                state.active = Some(conference.clone());
                out.push(ConferenceManagerEvent::ConferenceAdded(id));
                conference
            };

            let shared: SharedParticipant = Arc::new(RwLock::new(participant.clone()));
            let conference_id = {
                let mut conf = conference.write();
                if !conf.add_participant(key, shared.clone()) {
                    // Device reused the call id of a member that already left
                    debug!("Replacing stale participant {} in conference {}", key, conf.id());
                    conf.remove_participant(&key);
                    conf.add_participant(key, shared.clone());
                }
                conf.id()
            };
            debug!("Participant {} joined conference {}", key, conference_id);
            state.recent_participants.enqueue(shared.clone());
            state.tracked.insert(
                key,
                Tracked {
                    conference: conference.clone(),
                    participant: shared,
                },
            );
            out.push(ConferenceManagerEvent::ParticipantAdded {
                conference: conference_id,
                key,
                participant: participant.clone(),
            });

            self.refresh_conference(&mut state, &conference, &mut out);
            self.refresh_in_call(&mut state, &mut out);
        }
        self.emit(out);
    }

    fn participant_changed(&self, provider: ProviderKey, participant: &ParticipantState, removed: bool) {
        let key = ParticipantKey::new(provider, participant.call_id());
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(tracked) = state.tracked.get(&key).cloned() else {
                if !removed && participant.is_online() {
                    drop(state);
                    debug!("Untracked participant {} is online, adding it", key);
                    self.participant_added(provider, participant);
                } else {
                    debug!("Ignoring update for untracked participant {}", key);
                }
                return;
            };
            *tracked.participant.write() = participant.clone();
            let conference_id = tracked.conference.read().id();

            if removed {
                state.tracked.remove(&key);
                debug!("Participant {} left conference {}", key, conference_id);
                out.push(ConferenceManagerEvent::ParticipantRemoved {
                    conference: conference_id,
                    key,
                    participant: participant.clone(),
                });
            } else {
                out.push(ConferenceManagerEvent::ParticipantUpdated {
                    conference: conference_id,
                    key,
                    participant: participant.clone(),
                });
            }

            self.refresh_conference(&mut state, &tracked.conference, &mut out);
            self.refresh_in_call(&mut state, &mut out);
        }
        self.emit(out);
    }

    /// Re-derive a conference and tear it down once it has gone offline
    fn refresh_conference(
        &self,
        state: &mut ManagerState,
        conference: &SharedConference,
        out: &mut Vec<ConferenceManagerEvent>,
    ) {
        let (id, change, finished) = {
            let mut conf = conference.write();
            let change = conf.refresh();
            let finished = conf.is_finished() && conf.end().is_none();
            if finished {
                conf.mark_ended(Utc::now());
            }
            (conf.id(), change, finished)
        };

        if let Some((old, new)) = change {
            debug!("Conference {} status: {} -> {}", id, old, new);
            out.push(ConferenceManagerEvent::ConferenceStatusChanged {
                conference: id,
                old,
                new,
            });
        }

        if finished {
            info!("Conference {} ended", id);
            state.tracked.retain(|_, tracked| !Arc::ptr_eq(&tracked.conference, conference));
            if state.active.as_ref().is_some_and(|active| Arc::ptr_eq(active, conference)) {
                state.active = None;
            }
            out.push(ConferenceManagerEvent::ConferenceRemoved(id));
        }
    }

    fn refresh_in_call(&self, state: &mut ManagerState, out: &mut Vec<ConferenceManagerEvent>) {
        let in_call = state
            .tracked
            .values()
            .filter_map(|tracked| {
                let participant = tracked.participant.read();
                participant
                    .is_online()
                    .then(|| InCallState::from(participant.call_type()))
            })
            .max()
            .unwrap_or(InCallState::None);

        if in_call != state.in_call {
            info!("Room in-call state: {:?} -> {:?}", state.in_call, in_call);
            state.in_call = in_call;
            out.push(ConferenceManagerEvent::InCallChanged(in_call));
        }
    }

    // ========== Incoming calls ==========

    fn incoming_added(&self, provider: ProviderKey, call: &IncomingCall) {
        let key = ParticipantKey::new(provider, call.call_id);
        let is_new = self.state.lock().incoming.insert(key, call.clone()).is_none();
        if is_new {
            self.emit(vec![ConferenceManagerEvent::IncomingCallAdded {
                provider,
                call: call.clone(),
            }]);
        }
    }

    fn incoming_removed(&self, provider: ProviderKey, call: &IncomingCall) {
        let key = ParticipantKey::new(provider, call.call_id);
        let existed = self.state.lock().incoming.shift_remove(&key).is_some();
        if existed {
            self.emit(vec![ConferenceManagerEvent::IncomingCallRemoved {
                provider,
                call: call.clone(),
            }]);
        }
    }

    // ========== Policy ==========

    fn set_privacy_muted(&self, muted: bool) {
        {
            let mut policy = self.policy.lock();
            if policy.privacy_muted == muted {
                return;
            }
            policy.privacy_muted = muted;
        }
        info!("Room privacy mute set to {}", muted);
        self.emit(vec![ConferenceManagerEvent::PrivacyMuteChanged(muted)]);
        self.update_all_providers();
    }

    fn set_do_not_disturb(&self, enabled: bool) {
        {
            let mut policy = self.policy.lock();
            if policy.do_not_disturb == enabled {
                return;
            }
            policy.do_not_disturb = enabled;
        }
        info!("Room do not disturb set to {}", enabled);
        self.emit(vec![ConferenceManagerEvent::DoNotDisturbChanged(enabled)]);
        self.update_all_providers();
    }

    fn set_auto_answer(&self, enabled: bool) {
        {
            let mut policy = self.policy.lock();
            if policy.auto_answer == enabled {
                return;
            }
            policy.auto_answer = enabled;
        }
        info!("Room auto answer set to {}", enabled);
        self.emit(vec![ConferenceManagerEvent::AutoAnswerChanged(enabled)]);
        self.update_all_providers();
    }

    fn update_all_providers(&self) {
        let providers = self.providers.read().all();
        for provider in providers {
            self.update_provider(provider.as_ref());
        }
    }

    fn update_provider(&self, provider: &dyn DialingProvider) {
        let policy = *self.policy.lock();

        if provider.privacy_muted() != policy.privacy_muted {
            debug!("Pushing privacy mute {} to {}", policy.privacy_muted, provider.name());
            provider.set_privacy_mute(policy.privacy_muted);
        }
        if provider.do_not_disturb() != policy.do_not_disturb {
            debug!("Pushing do not disturb {} to {}", policy.do_not_disturb, provider.name());
            provider.set_do_not_disturb(policy.do_not_disturb);
        }
        if provider.auto_answer() != policy.auto_answer {
            debug!("Pushing auto answer {} to {}", policy.auto_answer, provider.name());
            provider.set_auto_answer(policy.auto_answer);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slots: Vec<(ProviderKey, Arc<dyn DialingProvider>)> = self
            .providers
            .get_mut()
            .slots
            .iter()
            .map(|(key, slot)| (*key, slot.provider.clone()))
            .collect();
        for (key, provider) in slots {
            provider.remove_event_handler(&self.handler_name(key));
        }
    }
}
