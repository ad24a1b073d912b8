//! Conferences
//!
//! A [`Conference`] groups the participants of one ongoing session across
//! every registered device. Its status and call type are derived from the
//! members; nothing sets them directly.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::participant::ParticipantState;
use crate::types::{CallId, CallType, InCallState, ParticipantStatus};

/// Participant state shared between a conference and the participant history
pub type SharedParticipant = Arc<RwLock<ParticipantState>>;

/// Conference identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConferenceId(pub Uuid);

impl ConferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf-{}", self.0)
    }
}

/// Identifies a registered provider inside the conference manager
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderKey(pub u64);

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

/// A call on a specific provider. Call ids are only unique per device.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantKey {
    pub provider: ProviderKey,
    pub call_id: CallId,
}

impl ParticipantKey {
    pub fn new(provider: ProviderKey, call_id: CallId) -> Self {
        Self { provider, call_id }
    }
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.call_id)
    }
}

/// Derived conference status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConferenceStatus {
    #[default]
    Undefined,
    Connecting,
    Connected,
    OnHold,
    Disconnecting,
    Disconnected,
}

impl ConferenceStatus {
    /// Status of a conference with the given member statuses
    pub fn derive<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ParticipantStatus>,
    {
        let mut any = false;
        let mut online = false;
        let mut connected = false;
        let mut connecting = false;
        let mut held = false;

        for status in statuses {
            any = true;
            if !status.is_online() {
                continue;
            }
            online = true;
            match status {
                s if s.is_connected() => connected = true,
                ParticipantStatus::Dialing | ParticipantStatus::Ringing | ParticipantStatus::Connecting => {
                    connecting = true
                }
                ParticipantStatus::OnHold => held = true,
                _ => {}
            }
        }

        if !any {
            ConferenceStatus::Undefined
        } else if !online {
            ConferenceStatus::Disconnected
        } else if connected {
            ConferenceStatus::Connected
        } else if connecting {
            ConferenceStatus::Connecting
        } else if held {
            ConferenceStatus::OnHold
        } else {
            ConferenceStatus::Disconnecting
        }
    }
}

impl fmt::Display for ConferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One ongoing session and its participants.
///
/// Clones share the participant handles, so a clone keeps observing
/// participant updates but not membership or status changes.
#[derive(Debug, Clone)]
pub struct Conference {
    id: ConferenceId,
    status: ConferenceStatus,
    call_type: CallType,
    participants: IndexMap<ParticipantKey, SharedParticipant>,
    has_been_online: bool,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl Conference {
    pub fn new() -> Self {
        Self::new_at(Utc::now())
    }

    pub fn new_at(start: DateTime<Utc>) -> Self {
        Self {
            id: ConferenceId::new(),
            status: ConferenceStatus::Undefined,
            call_type: CallType::Unknown,
            participants: IndexMap::new(),
            has_been_online: false,
            start,
            end: None,
        }
    }

    pub fn id(&self) -> ConferenceId {
        self.id
    }

    pub fn status(&self) -> ConferenceStatus {
        self.status
    }

    /// Highest priority call type among online participants. Keeps the last
    /// known value once everybody has left.
    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_online(&self) -> bool {
        self.participants.values().any(|p| p.read().is_online())
    }

    /// Set by [`refresh`](Self::refresh) once any member was seen online
    pub fn has_been_online(&self) -> bool {
        self.has_been_online
    }

    /// The conference went online and has since lost every online member
    pub fn is_finished(&self) -> bool {
        self.has_been_online && !self.is_online()
    }

    /// Room in-call contribution of this conference
    pub fn in_call_state(&self) -> InCallState {
        self.participants
            .values()
            .filter_map(|p| {
                let p = p.read();
                p.is_online().then(|| InCallState::from(p.call_type()))
            })
            .max()
            .unwrap_or(InCallState::None)
    }

    pub fn contains(&self, key: &ParticipantKey) -> bool {
        self.participants.contains_key(key)
    }

    pub fn participant(&self, key: &ParticipantKey) -> Option<ParticipantState> {
        self.participants.get(key).map(|p| p.read().clone())
    }

    /// Snapshot of all members in arrival order
    pub fn participants(&self) -> Vec<ParticipantState> {
        self.participants.values().map(|p| p.read().clone()).collect()
    }

    pub fn participant_keys(&self) -> Vec<ParticipantKey> {
        self.participants.keys().copied().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn online_participant_count(&self) -> usize {
        self.participants.values().filter(|p| p.read().is_online()).count()
    }

    /// Add a member. Returns false if the key is already present.
    pub fn add_participant(&mut self, key: ParticipantKey, participant: SharedParticipant) -> bool {
        if self.participants.contains_key(&key) {
            return false;
        }
        self.participants.insert(key, participant);
        true
    }

    pub fn remove_participant(&mut self, key: &ParticipantKey) -> Option<SharedParticipant> {
        self.participants.shift_remove(key)
    }

    /// Re-derive status and call type from the members.
    ///
    /// Returns the old and new status when the status changed.
    pub fn refresh(&mut self) -> Option<(ConferenceStatus, ConferenceStatus)> {
        let (statuses, best_online) = {
            let mut statuses = Vec::with_capacity(self.participants.len());
            let mut best: Option<CallType> = None;
            for participant in self.participants.values() {
                let p = participant.read();
                statuses.push(p.status());
                if p.is_online() {
                    best = best.max(Some(p.call_type()));
                }
            }
            (statuses, best)
        };

        if let Some(call_type) = best_online {
            self.call_type = call_type;
            self.has_been_online = true;
        }

        let status = ConferenceStatus::derive(statuses);
        if status == self.status {
            return None;
        }
        let old = self.status;
        self.status = status;
        Some((old, status))
    }

    pub(crate) fn mark_ended(&mut self, now: DateTime<Utc>) {
        if self.end.is_none() {
            self.end = Some(now);
        }
    }
}

impl Default for Conference {
    fn default() -> Self {
        Self::new()
    }
}
