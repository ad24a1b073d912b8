//! Call aggregator notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::participant::{ParticipantChange, ParticipantState};
use crate::types::{AnswerState, CallId, CallType};

/// An incoming call that has not been answered yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub call_id: CallId,
    pub name: Option<String>,
    pub number: Option<String>,
    pub call_type: CallType,
    pub answer_state: AnswerState,
    pub received_at: DateTime<Utc>,
}

impl IncomingCall {
    pub fn from_state(state: &ParticipantState, received_at: DateTime<Utc>) -> Self {
        Self {
            call_id: state.call_id(),
            name: state.name().map(str::to_string),
            number: state.number().or(state.remote_number()).map(str::to_string),
            call_type: state.call_type(),
            answer_state: state.answer_state(),
            received_at,
        }
    }
}

/// Events raised by a [`CallAggregator`](super::CallAggregator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEvent {
    /// A call became an active participant
    ParticipantAdded(ParticipantState),
    ParticipantUpdated {
        participant: ParticipantState,
        changes: Vec<ParticipantChange>,
    },
    /// The participant disconnected or was orphaned
    ParticipantRemoved(ParticipantState),
    IncomingCallAdded(IncomingCall),
    /// The incoming call was answered, rejected or dropped
    IncomingCallRemoved(IncomingCall),
    PrivacyMuteChanged(bool),
    DoNotDisturbChanged(bool),
    AutoAnswerChanged(bool),
}

/// Observer for call aggregator events.
///
/// Handlers run synchronously on the thread that delivered the device
/// status, after the aggregator has released its locks.
pub trait CallEventHandler: Send + Sync {
    fn handle_call_event(&self, event: &CallEvent);
}

impl<F> CallEventHandler for F
where
    F: Fn(&CallEvent) + Send + Sync,
{
    fn handle_call_event(&self, event: &CallEvent) {
        self(event)
    }
}
