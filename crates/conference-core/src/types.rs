//! Core identifiers and enums shared by every layer
//!
//! Device tokens are parsed with [`FromStr`]. A token with no mapping yields
//! [`ConferenceError::UnrecognizedToken`] rather than a default value, so the
//! caller can decide whether the field is skipped or the fragment rejected.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConferenceError, Result};

/// Device-assigned identifier of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CallId {
    fn from(id: u64) -> Self {
        CallId(id)
    }
}

/// Status of a single call leg as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticipantStatus {
    #[default]
    Undefined,
    Idle,
    Dialing,
    Ringing,
    Connecting,
    Connected,
    OnHold,
    EarlyMedia,
    Preserved,
    RemotePreserved,
    Disconnecting,
    Disconnected,
    /// The device stopped reporting the call without a disconnect
    Orphaned,
}

impl ParticipantStatus {
    /// Whether the call counts as "online".
    ///
    /// This partition, not the variant order, drives the Start/End
    /// timestamps and conference membership.
    pub fn is_online(&self) -> bool {
        match self {
            ParticipantStatus::Dialing
            | ParticipantStatus::Ringing
            | ParticipantStatus::Connecting
            | ParticipantStatus::Connected
            | ParticipantStatus::OnHold
            | ParticipantStatus::EarlyMedia
            | ParticipantStatus::Preserved
            | ParticipantStatus::RemotePreserved
            | ParticipantStatus::Disconnecting => true,
            ParticipantStatus::Undefined
            | ParticipantStatus::Idle
            | ParticipantStatus::Disconnected
            | ParticipantStatus::Orphaned => false,
        }
    }

    /// No further status changes are accepted once a call is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantStatus::Disconnected | ParticipantStatus::Orphaned)
    }

    /// Media is flowing (or preserved) with the far end
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Connected
                | ParticipantStatus::EarlyMedia
                | ParticipantStatus::Preserved
                | ParticipantStatus::RemotePreserved
        )
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ParticipantStatus {
    type Err = ConferenceError;

    fn from_str(token: &str) -> Result<Self> {
        let normalized = token.trim().to_ascii_lowercase();
        // Codecs report the British spelling
        let normalized = if normalized == "dialling" {
            "dialing".to_string()
        } else {
            normalized
        };

        match normalized.as_str() {
            "undefined" => Ok(ParticipantStatus::Undefined),
            "idle" => Ok(ParticipantStatus::Idle),
            "dialing" => Ok(ParticipantStatus::Dialing),
            "ringing" => Ok(ParticipantStatus::Ringing),
            "connecting" => Ok(ParticipantStatus::Connecting),
            "connected" => Ok(ParticipantStatus::Connected),
            "onhold" => Ok(ParticipantStatus::OnHold),
            "earlymedia" => Ok(ParticipantStatus::EarlyMedia),
            "preserved" => Ok(ParticipantStatus::Preserved),
            "remotepreserved" => Ok(ParticipantStatus::RemotePreserved),
            "disconnecting" => Ok(ParticipantStatus::Disconnecting),
            "disconnected" => Ok(ParticipantStatus::Disconnected),
            _ => Err(ConferenceError::unrecognized("participant status", token)),
        }
    }
}

/// Direction of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallDirection {
    #[default]
    Undefined,
    Incoming,
    Outgoing,
}

impl FromStr for CallDirection {
    type Err = ConferenceError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "undefined" => Ok(CallDirection::Undefined),
            "incoming" => Ok(CallDirection::Incoming),
            "outgoing" => Ok(CallDirection::Outgoing),
            _ => Err(ConferenceError::unrecognized("call direction", token)),
        }
    }
}

/// Answer state of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnswerState {
    #[default]
    Unknown,
    Unanswered,
    Ignored,
    Answered,
    AutoAnswered,
}

impl AnswerState {
    pub fn is_answered(&self) -> bool {
        matches!(self, AnswerState::Answered | AnswerState::AutoAnswered)
    }
}

impl FromStr for AnswerState {
    type Err = ConferenceError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(AnswerState::Unknown),
            "unanswered" => Ok(AnswerState::Unanswered),
            "ignored" => Ok(AnswerState::Ignored),
            "answered" => Ok(AnswerState::Answered),
            "autoanswered" => Ok(AnswerState::AutoAnswered),
            _ => Err(ConferenceError::unrecognized("answer state", token)),
        }
    }
}

/// Media type of a call. Ordering is the merge priority: Video > Audio > Unknown.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum CallType {
    #[default]
    Unknown,
    Audio,
    Video,
}

impl FromStr for CallType {
    type Err = ConferenceError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "unknown" | "forwardallcall" => Ok(CallType::Unknown),
            "audio" | "audiocanescalate" => Ok(CallType::Audio),
            "video" => Ok(CallType::Video),
            _ => Err(ConferenceError::unrecognized("call type", token)),
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Set of call types, used as a provider registration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallTypes(u8);

impl CallTypes {
    pub const NONE: CallTypes = CallTypes(0);
    pub const AUDIO: CallTypes = CallTypes(0b01);
    pub const VIDEO: CallTypes = CallTypes(0b10);
    pub const AUDIO_VIDEO: CallTypes = CallTypes(0b11);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: CallTypes) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: CallTypes) -> bool {
        self.0 & other.0 != 0
    }

    /// The highest priority call type in the set
    pub fn best(&self) -> CallType {
        if self.contains(CallTypes::VIDEO) {
            CallType::Video
        } else if self.contains(CallTypes::AUDIO) {
            CallType::Audio
        } else {
            CallType::Unknown
        }
    }
}

impl From<CallType> for CallTypes {
    fn from(call_type: CallType) -> Self {
        match call_type {
            CallType::Unknown => CallTypes::NONE,
            CallType::Audio => CallTypes::AUDIO,
            CallType::Video => CallTypes::VIDEO,
        }
    }
}

impl BitOr for CallTypes {
    type Output = CallTypes;

    fn bitor(self, rhs: CallTypes) -> CallTypes {
        CallTypes(self.0 | rhs.0)
    }
}

impl BitAnd for CallTypes {
    type Output = CallTypes;

    fn bitand(self, rhs: CallTypes) -> CallTypes {
        CallTypes(self.0 & rhs.0)
    }
}

impl fmt::Display for CallTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CallTypes::NONE => write!(f, "None"),
            CallTypes::AUDIO => write!(f, "Audio"),
            CallTypes::VIDEO => write!(f, "Video"),
            _ => write!(f, "Audio|Video"),
        }
    }
}

/// Signalling protocol requested for a dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DialProtocol {
    #[default]
    Unknown,
    Sip,
    Pstn,
    Zoom,
    ZoomContact,
}

impl fmt::Display for DialProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialProtocol::Unknown => "unknown",
            DialProtocol::Sip => "sip",
            DialProtocol::Pstn => "pstn",
            DialProtocol::Zoom => "zoom",
            DialProtocol::ZoomContact => "zoom-contact",
        };
        f.write_str(name)
    }
}

/// How well a provider can place a given dial request.
///
/// Ordering is the ranking used when choosing a dialer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum DialingSupport {
    #[default]
    Unsupported,
    Unknown,
    Supported,
    Native,
}

/// Protocol agnostic description of a dial request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialContext {
    pub protocol: DialProtocol,
    pub dial_string: String,
    pub call_type: CallType,
    pub password: Option<String>,
}

impl DialContext {
    pub fn new(dial_string: impl Into<String>) -> Self {
        Self {
            protocol: DialProtocol::Unknown,
            dial_string: dial_string.into(),
            call_type: CallType::Unknown,
            password: None,
        }
    }

    pub fn with_protocol(mut self, protocol: DialProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Aggregate in-call state of the room
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum InCallState {
    #[default]
    None,
    Audio,
    Video,
}

impl From<CallType> for InCallState {
    /// An online call of unknown media type still puts the room in a call
    fn from(call_type: CallType) -> Self {
        match call_type {
            CallType::Video => InCallState::Video,
            CallType::Audio | CallType::Unknown => InCallState::Audio,
        }
    }
}
