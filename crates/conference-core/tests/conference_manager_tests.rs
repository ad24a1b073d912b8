//! Conference manager: provider registries, dialer selection, policy
//! propagation, conference lifecycle and history.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, mpsc};

use roomcall_conference_core::{
    AggregatorConfig, AnswerState, CallAggregator, CallDirection, CallEventHandler, CallId, CallType, CallTypes,
    ConferenceConfig, ConferenceManager, ConferenceManagerEvent, ConferenceStatus, DeviceCommand, DialContext,
    DialProtocol, Dialable, DialingProvider, DialingSupport, HoldCapable, InCallState, IncomingCall, MuteCapable,
    ParticipantState, ParticipantStatus, ParticipantUpdate, ProviderKey, ProviderProfile,
};

/// Provider with a fixed dialing score that records what it is asked to do
struct StubProvider {
    name: String,
    call_types: CallTypes,
    support: DialingSupport,
    state: Mutex<StubState>,
}

#[derive(Default)]
struct StubState {
    privacy_muted: bool,
    do_not_disturb: bool,
    auto_answer: bool,
    mute_calls: Vec<bool>,
    dnd_calls: Vec<bool>,
    auto_answer_calls: Vec<bool>,
    dialed: Vec<DialContext>,
}

impl StubProvider {
    fn new(name: &str, call_types: CallTypes, support: DialingSupport) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            call_types,
            support,
            state: Mutex::new(StubState::default()),
        })
    }

    fn dialed(&self) -> Vec<DialContext> {
        self.state.lock().dialed.clone()
    }
}

impl Dialable for StubProvider {
    fn supported_call_types(&self) -> CallTypes {
        self.call_types
    }

    fn can_dial(&self, context: &DialContext) -> DialingSupport {
        if context.dial_string.is_empty() {
            DialingSupport::Unsupported
        } else {
            self.support
        }
    }

    fn dial(&self, context: &DialContext) -> roomcall_conference_core::Result<()> {
        self.state.lock().dialed.push(context.clone());
        Ok(())
    }
}

impl MuteCapable for StubProvider {
    fn privacy_muted(&self) -> bool {
        self.state.lock().privacy_muted
    }

    fn set_privacy_mute(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.mute_calls.push(enabled);
        state.privacy_muted = enabled;
    }
}

impl HoldCapable for StubProvider {
    fn supports_hold(&self) -> bool {
        false
    }

    fn hold(&self, _call_id: CallId) {}

    fn resume(&self, _call_id: CallId) {}
}

impl DialingProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn do_not_disturb(&self) -> bool {
        self.state.lock().do_not_disturb
    }

    fn set_do_not_disturb(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.dnd_calls.push(enabled);
        state.do_not_disturb = enabled;
    }

    fn auto_answer(&self) -> bool {
        self.state.lock().auto_answer
    }

    fn set_auto_answer(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.auto_answer_calls.push(enabled);
        state.auto_answer = enabled;
    }

    fn participants(&self) -> Vec<ParticipantState> {
        Vec::new()
    }

    fn incoming_calls(&self) -> Vec<IncomingCall> {
        Vec::new()
    }

    fn answer(&self, _call_id: CallId) {}

    fn reject(&self, _call_id: CallId) {}

    fn hangup_all(&self) {}

    fn add_event_handler(&self, _name: &str, _handler: Arc<dyn CallEventHandler>) {}

    fn remove_event_handler(&self, _name: &str) -> bool {
        true
    }
}

fn codec(name: &str) -> (Arc<CallAggregator>, mpsc::UnboundedReceiver<DeviceCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let aggregator = CallAggregator::with_runtime(
        ProviderProfile::cisco(name),
        AggregatorConfig::default(),
        Arc::new(tx),
        Arc::new(roomcall_conference_core::NameCache::new()),
        None,
    );
    (aggregator, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<DeviceCommand>) -> Vec<DeviceCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    commands
}

fn drain_events(rx: &mut broadcast::Receiver<ConferenceManagerEvent>) -> Vec<ConferenceManagerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn connected(call_type: CallType) -> ParticipantUpdate {
    ParticipantUpdate::new()
        .with_status(ParticipantStatus::Connected)
        .with_direction(CallDirection::Outgoing)
        .with_call_type(call_type)
}

fn disconnected() -> ParticipantUpdate {
    ParticipantUpdate::new().with_status(ParticipantStatus::Disconnected)
}

fn same(a: &Arc<dyn DialingProvider>, b: &Arc<StubProvider>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[test]
fn test_duplicate_mask_is_rejected() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let first = StubProvider::new("first", CallTypes::AUDIO_VIDEO, DialingSupport::Native);
    let second = StubProvider::new("second", CallTypes::AUDIO_VIDEO, DialingSupport::Native);

    assert!(manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, first.clone()));
    assert!(!manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, second));

    assert_eq!(manager.dialing_provider_count(), 1);
    let owner = manager.dialing_provider(CallTypes::AUDIO_VIDEO).unwrap();
    assert!(same(&owner, &first));
}

#[test]
fn test_first_registered_provider_is_default() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let audio = StubProvider::new("audio", CallTypes::AUDIO, DialingSupport::Supported);
    let video = StubProvider::new("video", CallTypes::VIDEO, DialingSupport::Supported);

    assert!(manager.register_dialing_provider(CallTypes::AUDIO, audio.clone()));
    assert!(manager.register_dialing_provider(CallTypes::VIDEO, video.clone()));
    assert!(same(&manager.default_dialing_provider().unwrap(), &audio));

    assert!(manager.deregister_dialing_provider(CallTypes::AUDIO));
    assert!(!manager.deregister_dialing_provider(CallTypes::AUDIO));
    assert!(same(&manager.default_dialing_provider().unwrap(), &video));
}

#[test]
fn test_dial_routes_by_call_type() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let audio = StubProvider::new("audio", CallTypes::AUDIO, DialingSupport::Supported);
    let video = StubProvider::new("video", CallTypes::VIDEO, DialingSupport::Supported);
    manager.register_dialing_provider(CallTypes::AUDIO, audio.clone());
    manager.register_dialing_provider(CallTypes::VIDEO, video.clone());

    manager.dial("5550100", CallType::Audio).unwrap();
    // Unknown resolves to the configured default, Video
    manager.dial("room@example.com", CallType::Unknown).unwrap();

    assert_eq!(audio.dialed().len(), 1);
    assert_eq!(audio.dialed()[0].call_type, CallType::Audio);
    assert_eq!(video.dialed().len(), 1);
    assert_eq!(video.dialed()[0].call_type, CallType::Video);
    assert_eq!(video.dialed()[0].dial_string, "room@example.com");
}

#[test]
fn test_dial_narrows_to_provider_support() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let audio_only = StubProvider::new("phone", CallTypes::AUDIO, DialingSupport::Supported);
    manager.register_dialing_provider(CallTypes::AUDIO, audio_only.clone());

    // No provider owns Video, so the default dials with what it supports
    manager.dial("5550100", CallType::Video).unwrap();
    assert_eq!(audio_only.dialed()[0].call_type, CallType::Audio);

    let manager = ConferenceManager::new(ConferenceConfig::default());
    let both = StubProvider::new("codec", CallTypes::AUDIO_VIDEO, DialingSupport::Native);
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, both.clone());
    manager.dial("5550100", CallType::Audio).unwrap();
    assert_eq!(both.dialed()[0].call_type, CallType::Audio);
}

#[test]
fn test_best_dialer_ranks_by_support() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let unknown = StubProvider::new("unknown", CallTypes::AUDIO, DialingSupport::Unknown);
    let supported = StubProvider::new("supported", CallTypes::AUDIO_VIDEO, DialingSupport::Supported);
    let native = StubProvider::new("native", CallTypes::VIDEO, DialingSupport::Native);
    let unsupported = StubProvider::new("unsupported", CallTypes::AUDIO, DialingSupport::Unsupported);
    manager.register_dialing_provider(CallTypes::AUDIO, unknown.clone());
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, supported.clone());
    manager.register_dialing_provider(CallTypes::VIDEO, native.clone());

    let video = DialContext::new("room@example.com").with_call_type(CallType::Video);
    assert!(same(&manager.get_best_dialer(&video).unwrap(), &native));

    // The native provider cannot do audio
    let audio = DialContext::new("5550100").with_call_type(CallType::Audio);
    assert!(same(&manager.get_best_dialer(&audio).unwrap(), &supported));

    // Nobody dials an empty string
    assert!(manager.get_best_dialer(&DialContext::new("")).is_none());

    let manager = ConferenceManager::new(ConferenceConfig::default());
    manager.register_dialing_provider(CallTypes::AUDIO, unsupported);
    assert!(manager.get_best_dialer(&audio).is_none());
}

#[test]
fn test_best_dialer_ties_go_to_first_registered() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let first = StubProvider::new("first", CallTypes::AUDIO, DialingSupport::Supported);
    let second = StubProvider::new("second", CallTypes::AUDIO_VIDEO, DialingSupport::Supported);
    manager.register_dialing_provider(CallTypes::AUDIO, first.clone());
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, second);

    let context = DialContext::new("5550100").with_call_type(CallType::Audio);
    assert!(same(&manager.get_best_dialer(&context).unwrap(), &first));

    manager.dial_context(&context).unwrap();
    assert_eq!(first.dialed().len(), 1);
}

#[test]
fn test_feedback_providers_never_dial() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let feedback = StubProvider::new("feedback", CallTypes::AUDIO_VIDEO, DialingSupport::Native);

    assert!(manager.register_feedback_dialing_provider(feedback.clone()));
    assert!(!manager.register_feedback_dialing_provider(feedback.clone()));
    assert_eq!(manager.feedback_provider_count(), 1);

    let context = DialContext::new("room@example.com").with_call_type(CallType::Video);
    assert!(manager.get_best_dialer(&context).is_none());
    assert!(manager.dial_context(&context).is_err());
    assert!(manager.dial("room@example.com", CallType::Video).is_err());
    assert!(feedback.dialed().is_empty());

    let handle: Arc<dyn DialingProvider> = feedback;
    assert!(manager.deregister_feedback_dialing_provider(&handle));
    assert!(!manager.deregister_feedback_dialing_provider(&handle));
}

#[test]
fn test_privacy_mute_pushed_once_to_differing_providers() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let unmuted = StubProvider::new("unmuted", CallTypes::AUDIO, DialingSupport::Supported);
    let muted = StubProvider::new("muted", CallTypes::VIDEO, DialingSupport::Supported);
    let feedback = StubProvider::new("feedback", CallTypes::AUDIO_VIDEO, DialingSupport::Supported);
    manager.register_dialing_provider(CallTypes::AUDIO, unmuted.clone());
    manager.register_dialing_provider(CallTypes::VIDEO, muted.clone());
    manager.register_feedback_dialing_provider(feedback.clone());
    muted.state.lock().privacy_muted = true;

    manager.set_privacy_muted(true);
    manager.set_privacy_muted(true);

    assert!(manager.privacy_muted());
    assert_eq!(unmuted.state.lock().mute_calls, vec![true]);
    assert!(muted.state.lock().mute_calls.is_empty());
    assert_eq!(feedback.state.lock().mute_calls, vec![true]);
    // Other flags already matched
    assert!(unmuted.state.lock().dnd_calls.is_empty());
    assert!(unmuted.state.lock().auto_answer_calls.is_empty());
}

#[test]
fn test_policy_pushed_on_registration() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    manager.set_do_not_disturb(true);
    manager.set_auto_answer(true);

    let late = StubProvider::new("late", CallTypes::AUDIO, DialingSupport::Supported);
    manager.register_dialing_provider(CallTypes::AUDIO, late.clone());

    let state = late.state.lock();
    assert_eq!(state.dnd_calls, vec![true]);
    assert_eq!(state.auto_answer_calls, vec![true]);
    assert!(state.mute_calls.is_empty());
}

#[test]
fn test_device_mute_is_adopted_by_the_room() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, mut a_rx) = codec("a");
    let (b, mut b_rx) = codec("b");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
    manager.register_feedback_dialing_provider(b.clone());
    let mut events = manager.subscribe();

    // Someone presses mute on device a
    a.on_privacy_mute_status(true);

    assert!(manager.privacy_muted());
    assert!(drain(&mut a_rx).is_empty());
    assert_eq!(drain(&mut b_rx), vec![DeviceCommand::SetPrivacyMute { enabled: true }]);
    assert!(drain_events(&mut events).contains(&ConferenceManagerEvent::PrivacyMuteChanged(true)));
}

#[test]
fn test_device_dnd_drift_is_pushed_back() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, mut a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    a.on_do_not_disturb_status(true);
    assert!(!manager.do_not_disturb());
    assert_eq!(drain(&mut a_rx), vec![DeviceCommand::SetDoNotDisturb { enabled: false }]);
}

#[test]
fn test_conference_lifecycle() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
    let mut events = manager.subscribe();

    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    a.on_status_fragment(CallId(2), &connected(CallType::Video));

    let conference = manager.active_conference().unwrap();
    assert_eq!(conference.status(), ConferenceStatus::Connected);
    assert_eq!(conference.call_type(), CallType::Video);
    assert_eq!(conference.participant_count(), 2);
    assert_eq!(manager.in_call(), InCallState::Video);

    let emitted = drain_events(&mut events);
    assert!(matches!(&emitted[0], ConferenceManagerEvent::ConferenceAdded(id) if *id == conference.id()));
    assert!(emitted.contains(&ConferenceManagerEvent::InCallChanged(InCallState::Audio)));
    assert!(emitted.contains(&ConferenceManagerEvent::InCallChanged(InCallState::Video)));

    a.on_status_fragment(CallId(2), &disconnected());
    assert_eq!(manager.in_call(), InCallState::Audio);
    assert!(manager.active_conference().is_some());

    a.on_status_fragment(CallId(1), &disconnected());
    assert_eq!(manager.in_call(), InCallState::None);
    assert!(manager.active_conference().is_none());
    assert!(drain_events(&mut events).contains(&ConferenceManagerEvent::ConferenceRemoved(conference.id())));

    let recent = manager.recent_conferences();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status(), ConferenceStatus::Disconnected);
    assert!(recent[0].end().is_some());
    // Call type is kept after everybody left
    assert_eq!(recent[0].call_type(), CallType::Video);

    a.on_status_fragment(CallId(3), &connected(CallType::Audio));
    let next = manager.active_conference().unwrap();
    assert_ne!(next.id(), conference.id());
    assert_eq!(manager.recent_conferences().len(), 2);
    assert_eq!(manager.recent_participants().len(), 3);
}

#[test]
fn test_participants_from_several_devices_share_a_conference() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    let (b, _b_rx) = codec("b");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
    manager.register_feedback_dialing_provider(b.clone());

    // Same call id on two devices is two participants
    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    b.on_status_fragment(CallId(1), &connected(CallType::Audio));

    assert_eq!(manager.active_conference().unwrap().participant_count(), 2);
    assert_eq!(manager.recent_conferences().len(), 1);
}

#[test]
fn test_updates_do_not_touch_history() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    a.on_status_fragment(CallId(1), &ParticipantUpdate::new().with_status(ParticipantStatus::Dialing));
    a.on_status_fragment(CallId(1), &ParticipantUpdate::new().with_status(ParticipantStatus::Ringing));
    a.on_status_fragment(CallId(1), &connected(CallType::Video));

    assert_eq!(manager.recent_participants().len(), 1);
    assert_eq!(manager.recent_conferences().len(), 1);
    // History entries follow the live participant
    assert_eq!(manager.recent_participants()[0].status(), ParticipantStatus::Connected);
}

#[test]
fn test_participant_history_is_bounded() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    for id in 1..=101 {
        a.on_status_fragment(CallId(id), &connected(CallType::Audio));
    }

    let recent = manager.recent_participants();
    assert_eq!(recent.len(), 100);
    assert_eq!(recent.first().map(|p| p.call_id()), Some(CallId(2)));
    assert_eq!(recent.last().map(|p| p.call_id()), Some(CallId(101)));
}

#[test]
fn test_registration_ingests_existing_calls() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, mut a_rx) = codec("a");
    a.on_status_fragment(CallId(4), &connected(CallType::Video));
    a.on_status_fragment(
        CallId(5),
        &ParticipantUpdate::new()
            .with_status(ParticipantStatus::Ringing)
            .with_direction(CallDirection::Incoming)
            .with_answer_state(AnswerState::Unanswered),
    );

    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    assert_eq!(manager.in_call(), InCallState::Video);
    let incoming = manager.incoming_calls();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].call.call_id, CallId(5));
    assert_eq!(incoming[0].provider_name, "a");

    assert!(manager.answer_incoming(incoming[0].provider, CallId(5)));
    assert_eq!(drain(&mut a_rx), vec![DeviceCommand::Accept { call_id: CallId(5) }]);
}

#[test]
fn test_deregistration_drops_provider_calls() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    assert_eq!(a.event_handler_count(), 1);

    assert!(manager.deregister_dialing_provider(CallTypes::AUDIO_VIDEO));
    assert_eq!(a.event_handler_count(), 0);
    assert_eq!(manager.in_call(), InCallState::None);
    assert!(manager.active_conference().is_none());

    // No longer observed
    a.on_status_fragment(CallId(2), &connected(CallType::Audio));
    assert_eq!(manager.in_call(), InCallState::None);
}

#[test]
fn test_dropping_manager_unsubscribes() {
    let (a, _a_rx) = codec("a");
    {
        let manager = ConferenceManager::new(ConferenceConfig::default());
        manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
        assert_eq!(a.event_handler_count(), 1);
    }
    assert_eq!(a.event_handler_count(), 0);
}

#[test]
fn test_hangup_all_reaches_every_provider() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, mut a_rx) = codec("a");
    let (b, mut b_rx) = codec("b");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());
    manager.register_feedback_dialing_provider(b.clone());
    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    b.on_status_fragment(CallId(8), &connected(CallType::Video));

    manager.hangup_all();
    assert_eq!(drain(&mut a_rx), vec![DeviceCommand::Disconnect { call_id: CallId(1) }]);
    assert_eq!(drain(&mut b_rx), vec![DeviceCommand::Disconnect { call_id: CallId(8) }]);
}

#[test]
fn test_dial_through_codec_uses_default_protocol() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, mut a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a);

    manager.dial("sip:lobby@example.com", CallType::Unknown).unwrap();
    assert_eq!(
        drain(&mut a_rx),
        vec![DeviceCommand::Dial {
            number: "sip:lobby@example.com".to_string(),
            protocol: DialProtocol::Sip,
            call_type: CallType::Video,
            password: None,
        }]
    );
}

#[test]
fn test_reused_call_id_rejoins_active_conference() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    a.on_status_fragment(CallId(2), &connected(CallType::Audio));
    a.on_status_fragment(CallId(1), &disconnected());
    let conference = manager.active_conference().unwrap();

    // Device hands out call id 1 again while call 2 is still up
    a.on_status_fragment(CallId(1), &connected(CallType::Video));
    let rejoined = manager.active_conference().unwrap();
    assert_eq!(rejoined.id(), conference.id());
    assert_eq!(rejoined.participant_count(), 2);
    let key = rejoined
        .participant_keys()
        .into_iter()
        .find(|key| key.call_id == CallId(1))
        .unwrap();
    assert_eq!(rejoined.participant(&key).unwrap().status(), ParticipantStatus::Connected);
    assert_eq!(manager.in_call(), InCallState::Video);

    a.on_status_fragment(CallId(2), &disconnected());
    assert_eq!(manager.in_call(), InCallState::Video);
    assert_eq!(manager.active_conference().unwrap().id(), conference.id());

    a.on_status_fragment(CallId(1), &ParticipantUpdate::new().with_status(ParticipantStatus::OnHold));
    assert_eq!(
        manager.participant(key.provider, CallId(1)).unwrap().status(),
        ParticipantStatus::OnHold
    );
    assert_eq!(manager.in_call(), InCallState::Video);

    a.on_status_fragment(CallId(1), &disconnected());
    assert_eq!(manager.in_call(), InCallState::None);
    assert!(manager.active_conference().is_none());
}

#[test]
fn test_participant_back_online_after_conference_ended() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (a, _a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a.clone());

    a.on_status_fragment(CallId(1), &connected(CallType::Audio));
    let first = manager.active_conference().unwrap();

    // Disconnecting is offline but the device still knows the call
    a.on_status_fragment(
        CallId(1),
        &ParticipantUpdate::new().with_status(ParticipantStatus::Disconnecting),
    );
    assert!(a.has_call(CallId(1)));
    assert!(manager.active_conference().is_none());
    assert_eq!(manager.in_call(), InCallState::None);

    a.on_status_fragment(CallId(1), &ParticipantUpdate::new().with_status(ParticipantStatus::Connected));
    let second = manager.active_conference().unwrap();
    assert_ne!(second.id(), first.id());
    assert_eq!(second.participant_count(), 1);
    assert_eq!(manager.in_call(), InCallState::Audio);
    assert_eq!(manager.recent_conferences().len(), 2);
}

#[test]
fn test_policy_reaches_silent_room_once() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let room = CallAggregator::with_runtime(
        ProviderProfile::zoom("zoom-room"),
        AggregatorConfig::default(),
        Arc::new(tx),
        Arc::new(roomcall_conference_core::NameCache::new()),
        None,
    );
    manager.register_dialing_provider(CallTypes::VIDEO, room.clone());
    assert!(drain(&mut rx).is_empty());

    manager.set_do_not_disturb(true);
    manager.set_privacy_muted(true);
    // The room confirms the microphone but never reports do not disturb
    room.on_privacy_mute_status(true);
    manager.set_auto_answer(true);
    manager.set_privacy_muted(false);

    assert_eq!(
        drain(&mut rx),
        vec![
            DeviceCommand::SetDoNotDisturb { enabled: true },
            DeviceCommand::SetPrivacyMute { enabled: true },
            DeviceCommand::SetAutoAnswer { enabled: true },
            DeviceCommand::SetPrivacyMute { enabled: false },
        ]
    );
    assert!(room.do_not_disturb());
    assert!(room.auto_answer());
}

#[test]
fn test_unknown_provider_or_call_is_refused() {
    let manager = ConferenceManager::new(ConferenceConfig::default());
    let mut events = manager.subscribe();
    let (a, mut a_rx) = codec("a");
    manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, a);

    let provider = drain_events(&mut events)
        .into_iter()
        .find_map(|event| match event {
            ConferenceManagerEvent::ProviderRegistered { provider, .. } => Some(provider),
            _ => None,
        })
        .unwrap();

    assert!(!manager.answer_incoming(ProviderKey(provider.0 + 1), CallId(1)));
    assert!(!manager.reject_incoming(ProviderKey(provider.0 + 1), CallId(1)));

    // Known provider, unknown call: forwarded, and the device drops it
    assert!(manager.answer_incoming(provider, CallId(1)));
    assert!(drain(&mut a_rx).is_empty());
}
