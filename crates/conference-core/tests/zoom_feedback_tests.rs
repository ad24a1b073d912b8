//! Zoom Room messages driven end to end through the room binding

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use roomcall_conference_core::{
    AggregatorConfig, AnswerState, CallAggregator, CallDirection, CallEvent, CallId, CallType, DeviceCommand,
    NameCache, ParticipantStatus, ProviderProfile, StatusDispatchRegistry, ZoomRoom,
};

struct Room {
    room: ZoomRoom,
    _commands: mpsc::UnboundedReceiver<DeviceCommand>,
    events: Arc<Mutex<Vec<CallEvent>>>,
}

impl Room {
    fn new() -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let aggregator = CallAggregator::with_runtime(
            ProviderProfile::zoom("zoom-room"),
            AggregatorConfig::default(),
            Arc::new(tx),
            Arc::new(NameCache::new()),
            None,
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        aggregator.add_event_handler(
            "recorder",
            Arc::new(move |event: &CallEvent| sink.lock().push(event.clone())),
        );
        Self {
            room: ZoomRoom::new(aggregator, Arc::new(StatusDispatchRegistry::new())),
            _commands: commands,
            events,
        }
    }

    fn aggregator(&self) -> &Arc<CallAggregator> {
        self.room.aggregator()
    }

    fn send(&self, message: serde_json::Value) {
        self.room.handle_message(&message.to_string()).unwrap();
    }

    fn take_events(&self) -> Vec<CallEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

fn invite(jid: &str, name: &str) -> serde_json::Value {
    json!({
        "IncomingCallIndication": {
            "callerJID": jid,
            "callerName": name,
            "meetingID": "123456789",
            "isDirectShareCall": false
        },
        "Status": {"message": "", "state": "OK"},
        "topKey": "IncomingCallIndication",
        "type": "zEvent"
    })
}

fn treated(jid: &str, accepted: bool) -> serde_json::Value {
    json!({
        "TreatedIncomingCallIndication": {"callerJID": jid, "accepted": accepted},
        "topKey": "TreatedIncomingCallIndication",
        "type": "zEvent"
    })
}

fn call_status(status: &str) -> serde_json::Value {
    json!({
        "CallStatus": {"Status": status},
        "Status": {"message": "", "state": "OK"},
        "topKey": "CallStatus",
        "type": "zStatus"
    })
}

#[test]
fn test_accepted_invitation_becomes_participant() {
    let room = Room::new();
    room.send(invite("alice@xmpp.zoom.us", "Alice"));

    let incoming = room.aggregator().incoming_calls();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].name.as_deref(), Some("Alice"));
    assert_eq!(incoming[0].number.as_deref(), Some("alice@xmpp.zoom.us"));
    assert_eq!(incoming[0].call_type, CallType::Video);
    let call_id = incoming[0].call_id;

    // A repeated indication does not open a second call
    room.send(invite("alice@xmpp.zoom.us", "Alice"));
    assert_eq!(room.aggregator().call_count(), 1);
    room.take_events();

    room.send(treated("alice@xmpp.zoom.us", true));
    assert_eq!(room.room.current_call(), Some(call_id));
    assert!(room.aggregator().incoming_calls().is_empty());
    let participant = room.aggregator().call(call_id).unwrap();
    assert_eq!(participant.answer_state(), AnswerState::Answered);
    assert_eq!(participant.status(), ParticipantStatus::Connecting);

    let events = room.take_events();
    assert!(matches!(events[0], CallEvent::IncomingCallRemoved(_)));
    assert!(matches!(events[1], CallEvent::ParticipantAdded(_)));

    room.send(call_status("IN_MEETING"));
    assert_eq!(room.aggregator().call(call_id).unwrap().status(), ParticipantStatus::Connected);

    room.send(call_status("NOT_IN_MEETING"));
    assert!(!room.aggregator().has_call(call_id));
    assert_eq!(room.room.current_call(), None);
    assert!(matches!(room.take_events().last(), Some(CallEvent::ParticipantRemoved(_))));
}

#[test]
fn test_declined_invitation_never_becomes_participant() {
    let room = Room::new();
    room.send(invite("bob@xmpp.zoom.us", "Bob"));
    room.take_events();

    room.send(treated("bob@xmpp.zoom.us", false));
    assert_eq!(room.aggregator().call_count(), 0);
    assert_eq!(room.room.current_call(), None);

    let events = room.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], CallEvent::IncomingCallRemoved(call) if call.answer_state == AnswerState::Ignored));

    // Unknown invitation is ignored
    room.send(treated("carol@xmpp.zoom.us", true));
    assert_eq!(room.room.current_call(), None);
    assert!(room.take_events().is_empty());
}

#[test]
fn test_meeting_started_from_the_room() {
    let room = Room::new();
    room.send(call_status("CONNECTING_MEETING"));

    let call_id = room.room.current_call().unwrap();
    let participant = room.aggregator().call(call_id).unwrap();
    assert_eq!(participant.direction(), CallDirection::Outgoing);
    assert_eq!(participant.status(), ParticipantStatus::Connecting);
    assert_eq!(participant.call_type(), CallType::Video);

    room.send(call_status("IN_MEETING"));
    assert_eq!(room.room.current_call(), Some(call_id));
    assert_eq!(room.aggregator().call_count(), 1);

    room.send(call_status("LOGGED_OUT"));
    assert_eq!(room.aggregator().call_count(), 0);

    // Next meeting gets a fresh id
    room.send(call_status("IN_MEETING"));
    let next = room.room.current_call().unwrap();
    assert!(next > call_id);
}

#[test]
fn test_not_in_meeting_without_a_meeting_is_ignored() {
    let room = Room::new();
    room.send(call_status("NOT_IN_MEETING"));
    assert_eq!(room.aggregator().call_count(), 0);
    assert!(room.take_events().is_empty());
}

#[test]
fn test_microphone_mute_configuration() {
    let room = Room::new();
    room.send(json!({
        "CallConfiguration": {"Microphone": {"Mute": true}},
        "Status": {"message": "", "state": "OK"},
        "topKey": "CallConfiguration",
        "type": "zConfiguration"
    }));
    assert!(room.aggregator().privacy_muted());
    assert_eq!(room.take_events(), vec![CallEvent::PrivacyMuteChanged(true)]);

    room.send(json!({
        "CallConfiguration": {"Microphone": {"Mute": "off"}},
        "topKey": "CallConfiguration",
        "type": "zConfiguration"
    }));
    assert!(!room.aggregator().privacy_muted());

    // Other configuration members are not about the microphone
    room.send(json!({
        "CallConfiguration": {"Camera": {"Mute": true}},
        "topKey": "CallConfiguration",
        "type": "zConfiguration"
    }));
    assert!(!room.aggregator().privacy_muted());
}

#[test]
fn test_bad_messages_leave_state_alone() {
    let room = Room::new();
    room.send(call_status("IN_MEETING"));
    let call_id = room.room.current_call().unwrap();
    room.take_events();

    // Unknown status token is logged and dropped
    room.send(call_status("IN_WAITING_ROOM"));
    assert_eq!(room.aggregator().call(call_id).unwrap().status(), ParticipantStatus::Connected);
    assert!(room.take_events().is_empty());

    // Nobody listens for this key
    room.send(json!({
        "Sharing": {"isSharingBlackMagic": false},
        "topKey": "Sharing",
        "type": "zStatus"
    }));
    assert!(room.take_events().is_empty());

    assert!(room.room.handle_message("{").is_err());
    assert!(room.room.handle_message(r#"{"topKey": "CallStatus", "type": "zStatus"}"#).is_err());
}

#[test]
fn test_device_offline_orphans_the_meeting() {
    let room = Room::new();
    room.send(call_status("IN_MEETING"));
    room.send(invite("dave@xmpp.zoom.us", "Dave"));
    assert_eq!(room.aggregator().call_count(), 2);
    let meeting = room.room.current_call().unwrap();

    room.room.handle_device_offline();
    assert_eq!(room.aggregator().call_count(), 0);
    assert_eq!(room.room.current_call(), None);

    // Ids are not reused after reconnecting
    room.send(call_status("IN_MEETING"));
    assert!(room.room.current_call().unwrap() > meeting);
    assert!(room.aggregator().call(meeting).is_none());
    assert!(room.aggregator().has_call(room.room.current_call().unwrap()));
    assert_eq!(room.aggregator().call(CallId(0)), None);
}

#[test]
fn test_accepting_invitation_leaves_current_meeting() {
    let room = Room::new();
    room.send(call_status("IN_MEETING"));
    let meeting = room.room.current_call().unwrap();

    room.send(invite("bob@xmpp.zoom.us", "Bob"));
    let invitation = room.aggregator().incoming_calls()[0].call_id;
    room.take_events();

    room.send(treated("bob@xmpp.zoom.us", true));
    assert_eq!(room.room.current_call(), Some(invitation));
    assert!(!room.aggregator().has_call(meeting));
    assert!(room
        .take_events()
        .iter()
        .any(|event| matches!(event, CallEvent::ParticipantRemoved(p) if p.call_id() == meeting)));

    room.send(call_status("IN_MEETING"));
    assert_eq!(room.aggregator().call(invitation).unwrap().status(), ParticipantStatus::Connected);

    room.send(call_status("NOT_IN_MEETING"));
    assert_eq!(room.aggregator().call_count(), 0);
    assert!(room.aggregator().participants().is_empty());
}

#[test]
fn test_room_settings_follow_commands() {
    let room = Room::new();
    room.aggregator().set_do_not_disturb(true);
    room.aggregator().set_auto_answer(true);
    room.aggregator().set_privacy_mute(true);

    assert!(room.aggregator().do_not_disturb());
    assert!(room.aggregator().auto_answer());
    // Microphone mute is reported by the room, so it waits for feedback
    assert!(!room.aggregator().privacy_muted());
}
