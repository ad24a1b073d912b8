//! Zoom Room style feedback
//!
//! A Zoom Room sends one JSON object per message. The `type` field names the
//! category and `topKey` names the member holding the payload:
//!
//! ```json
//! {"CallConfiguration": {"Microphone": {"Mute": true}},
//!  "Status": {"message": "", "state": "OK"},
//!  "topKey": "CallConfiguration", "type": "zConfiguration"}
//! ```
//!
//! The room has no call ids of its own. [`ZoomRoom`] tracks the current
//! meeting and pending incoming invitations and maps them onto synthetic
//! call ids for its [`CallAggregator`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::parse_toggle;
use crate::aggregator::CallAggregator;
use crate::dispatch::{StatusCallback, StatusCategory, StatusDispatchRegistry, StatusKey};
use crate::errors::{ConferenceError, Result};
use crate::participant::ParticipantUpdate;
use crate::types::{AnswerState, CallDirection, CallId, CallType, ParticipantStatus};

/// One decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomMessage {
    pub category: StatusCategory,
    pub top_key: String,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "topKey")]
    top_key: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ZoomMessage {
    pub fn parse(json: &str) -> Result<ZoomMessage> {
        let mut value: Value = serde_json::from_str(json)?;
        let envelope = Envelope::deserialize(&value)?;
        let category = match envelope.kind.as_str() {
            "zStatus" => StatusCategory::Status,
            "zConfiguration" => StatusCategory::Configuration,
            "zEvent" => StatusCategory::Event,
            other => return Err(ConferenceError::unrecognized("message type", other)),
        };
        let payload = value
            .get_mut(&envelope.top_key)
            .map(Value::take)
            .ok_or_else(|| ConferenceError::malformed(format!("missing {} payload", envelope.top_key)))?;

        Ok(ZoomMessage {
            category,
            top_key: envelope.top_key,
            payload,
        })
    }

    pub fn key(&self) -> StatusKey {
        StatusKey::tag(self.category, self.top_key.clone())
    }

    fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingCallIndication {
    #[serde(rename = "callerJID")]
    caller_jid: String,
    #[serde(default)]
    caller_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreatedIncomingCallIndication {
    #[serde(rename = "callerJID")]
    caller_jid: String,
    accepted: bool,
}

#[derive(Debug, Deserialize)]
struct CallStatus {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CallConfiguration {
    #[serde(rename = "Microphone")]
    microphone: Option<Microphone>,
}

#[derive(Debug, Deserialize)]
struct Microphone {
    #[serde(rename = "Mute")]
    mute: Value,
}

/// Map a room call status token onto a participant status
fn parse_call_status(token: &str) -> Result<ParticipantStatus> {
    match token.trim() {
        "CONNECTING_MEETING" => Ok(ParticipantStatus::Connecting),
        "IN_MEETING" => Ok(ParticipantStatus::Connected),
        "NOT_IN_MEETING" | "LOGGED_OUT" => Ok(ParticipantStatus::Disconnected),
        _ => Err(ConferenceError::unrecognized("zoom call status", token)),
    }
}

#[derive(Debug, Default)]
struct MeetingState {
    last_call_id: u64,
    /// Call id of the meeting the room is in or joining
    current: Option<CallId>,
    /// Unanswered invitations by caller JID
    pending: HashMap<String, CallId>,
}

impl MeetingState {
    fn allocate(&mut self) -> CallId {
        self.last_call_id += 1;
        CallId(self.last_call_id)
    }
}

/// Binds a Zoom Room's messages to a call aggregator
pub struct ZoomRoom {
    aggregator: Arc<CallAggregator>,
    registry: Arc<StatusDispatchRegistry<ZoomMessage>>,
    meeting: Arc<Mutex<MeetingState>>,
    registrations: Vec<(StatusKey, StatusCallback<ZoomMessage>)>,
}

impl ZoomRoom {
    pub fn new(aggregator: Arc<CallAggregator>, registry: Arc<StatusDispatchRegistry<ZoomMessage>>) -> Self {
        let meeting = Arc::new(Mutex::new(MeetingState::default()));
        let weak = Arc::downgrade(&aggregator);

        let registrations: Vec<(StatusKey, StatusCallback<ZoomMessage>)> = vec![
            (
                StatusKey::tag(StatusCategory::Event, "IncomingCallIndication"),
                handler(weak.clone(), meeting.clone(), on_incoming_call),
            ),
            (
                StatusKey::tag(StatusCategory::Event, "TreatedIncomingCallIndication"),
                handler(weak.clone(), meeting.clone(), on_treated_incoming_call),
            ),
            (
                StatusKey::tag(StatusCategory::Status, "CallStatus"),
                handler(weak.clone(), meeting.clone(), on_call_status),
            ),
            (
                StatusKey::tag(StatusCategory::Configuration, "CallConfiguration"),
                handler(weak, meeting.clone(), on_call_configuration),
            ),
        ];
        for (key, callback) in &registrations {
            registry.register(key.clone(), callback.clone());
        }

        Self {
            aggregator,
            registry,
            meeting,
            registrations,
        }
    }

    pub fn aggregator(&self) -> &Arc<CallAggregator> {
        &self.aggregator
    }

    /// Handle one JSON message from the room
    pub fn handle_message(&self, json: &str) -> Result<()> {
        let message = ZoomMessage::parse(json)?;
        let key = message.key();
        if self.registry.dispatch(&key, &message) == 0 {
            debug!("[{}] No handler for {}", self.aggregator.name(), key);
        }
        Ok(())
    }

    /// The connection to the room was lost
    pub fn handle_device_offline(&self) {
        {
            // Call ids keep counting so stale ids are never reused
            let mut meeting = self.meeting.lock();
            meeting.current = None;
            meeting.pending.clear();
        }
        self.aggregator.on_device_offline();
    }

    /// Call id of the current meeting, if any
    pub fn current_call(&self) -> Option<CallId> {
        self.meeting.lock().current
    }
}

impl Drop for ZoomRoom {
    fn drop(&mut self) {
        for (key, callback) in &self.registrations {
            self.registry.unregister(key, callback);
        }
    }
}

type MessageHandler = fn(&CallAggregator, &Mutex<MeetingState>, &ZoomMessage) -> Result<()>;

fn handler(
    aggregator: Weak<CallAggregator>,
    meeting: Arc<Mutex<MeetingState>>,
    handle: MessageHandler,
) -> StatusCallback<ZoomMessage> {
    Arc::new(move |message: &ZoomMessage| {
        let Some(aggregator) = aggregator.upgrade() else {
            return;
        };
        if let Err(e) = handle(&aggregator, &meeting, message) {
            warn!("[{}] Bad {} message: {}", aggregator.name(), message.top_key, e);
        }
    })
}

fn on_incoming_call(aggregator: &CallAggregator, meeting: &Mutex<MeetingState>, message: &ZoomMessage) -> Result<()> {
    let indication: IncomingCallIndication = message.payload()?;
    let call_id = {
        let mut meeting = meeting.lock();
        match meeting.pending.get(&indication.caller_jid) {
            Some(call_id) => *call_id,
            None => {
                let call_id = meeting.allocate();
                meeting.pending.insert(indication.caller_jid.clone(), call_id);
                call_id
            }
        }
    };

    let mut update = ParticipantUpdate::new()
        .with_status(ParticipantStatus::Ringing)
        .with_direction(CallDirection::Incoming)
        .with_answer_state(AnswerState::Unanswered)
        .with_call_type(CallType::Video)
        .with_number(indication.caller_jid);
    update.name = indication.caller_name;
    aggregator.on_status_fragment(call_id, &update);
    Ok(())
}

fn on_treated_incoming_call(
    aggregator: &CallAggregator,
    meeting: &Mutex<MeetingState>,
    message: &ZoomMessage,
) -> Result<()> {
    let treated: TreatedIncomingCallIndication = message.payload()?;
    let (call_id, left) = {
        let mut meeting = meeting.lock();
        let Some(call_id) = meeting.pending.remove(&treated.caller_jid) else {
            warn!(
                "[{}] Invitation from {} was never announced",
                aggregator.name(),
                treated.caller_jid
            );
            return Ok(());
        };
        let left = if treated.accepted {
            meeting.current.replace(call_id).filter(|old| *old != call_id)
        } else {
            None
        };
        (call_id, left)
    };

    // Accepting an invitation moves the room out of its current meeting
    if let Some(old) = left {
        debug!("[{}] Leaving meeting {} for invitation {}", aggregator.name(), old, call_id);
        aggregator.on_status_fragment(old, &ParticipantUpdate::new().with_status(ParticipantStatus::Disconnected));
    }

    let update = if treated.accepted {
        info!("[{}] Invitation from {} accepted", aggregator.name(), treated.caller_jid);
        ParticipantUpdate::new()
            .with_answer_state(AnswerState::Answered)
            .with_status(ParticipantStatus::Connecting)
    } else {
        info!("[{}] Invitation from {} declined", aggregator.name(), treated.caller_jid);
        ParticipantUpdate::new()
            .with_answer_state(AnswerState::Ignored)
            .with_status(ParticipantStatus::Disconnected)
    };
    aggregator.on_status_fragment(call_id, &update);
    Ok(())
}

fn on_call_status(aggregator: &CallAggregator, meeting: &Mutex<MeetingState>, message: &ZoomMessage) -> Result<()> {
    let call_status: CallStatus = message.payload()?;
    let status = parse_call_status(&call_status.status)?;

    let (call_id, started) = {
        let mut meeting = meeting.lock();
        if status.is_online() {
            match meeting.current {
                Some(call_id) => (call_id, false),
                None => {
                    let call_id = meeting.allocate();
                    meeting.current = Some(call_id);
                    (call_id, true)
                }
            }
        } else {
            match meeting.current.take() {
                Some(call_id) => (call_id, false),
                None => return Ok(()),
            }
        }
    };

    let mut update = ParticipantUpdate::new().with_status(status);
    if started {
        debug!("[{}] Meeting started as call {}", aggregator.name(), call_id);
        update = update
            .with_direction(CallDirection::Outgoing)
            .with_call_type(CallType::Video);
    }
    aggregator.on_status_fragment(call_id, &update);
    Ok(())
}

fn on_call_configuration(
    aggregator: &CallAggregator,
    _meeting: &Mutex<MeetingState>,
    message: &ZoomMessage,
) -> Result<()> {
    let configuration: CallConfiguration = message.payload()?;
    let Some(microphone) = configuration.microphone else {
        return Ok(());
    };
    let muted = match &microphone.mute {
        Value::Bool(muted) => *muted,
        Value::String(token) => parse_toggle(token)?,
        other => return Err(ConferenceError::unrecognized("microphone mute", other.to_string())),
    };
    aggregator.on_privacy_mute_status(muted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let message = ZoomMessage::parse(
            &json!({
                "CallStatus": {"Status": "IN_MEETING"},
                "Status": {"message": "", "state": "OK"},
                "topKey": "CallStatus",
                "type": "zStatus"
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(message.category, StatusCategory::Status);
        assert_eq!(message.key(), StatusKey::tag(StatusCategory::Status, "CallStatus"));
        assert_eq!(message.payload, json!({"Status": "IN_MEETING"}));
    }

    #[test]
    fn test_bad_envelopes() {
        assert!(matches!(
            ZoomMessage::parse("not json"),
            Err(ConferenceError::MalformedFragment(_))
        ));
        assert!(ZoomMessage::parse(r#"{"topKey": "X", "type": "zBogus", "X": {}}"#)
            .unwrap_err()
            .is_parse_error());
        assert!(matches!(
            ZoomMessage::parse(r#"{"topKey": "X", "type": "zEvent"}"#),
            Err(ConferenceError::MalformedFragment(_))
        ));
    }

    #[test]
    fn test_call_status_tokens() {
        assert_eq!(parse_call_status("IN_MEETING").unwrap(), ParticipantStatus::Connected);
        assert_eq!(
            parse_call_status("CONNECTING_MEETING").unwrap(),
            ParticipantStatus::Connecting
        );
        assert_eq!(parse_call_status("LOGGED_OUT").unwrap(), ParticipantStatus::Disconnected);
        assert!(parse_call_status("IN_WAITING_ROOM").unwrap_err().is_parse_error());
    }
}
