//! Conference manager notifications

use crate::aggregator::IncomingCall;
use crate::conference::{ConferenceId, ConferenceStatus, ParticipantKey, ProviderKey};
use crate::participant::ParticipantState;
use crate::types::InCallState;

/// Events broadcast by the [`ConferenceManager`](super::ConferenceManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceManagerEvent {
    ProviderRegistered {
        provider: ProviderKey,
        name: String,
    },
    ProviderDeregistered {
        provider: ProviderKey,
        name: String,
    },
    /// A new conference became the active one
    ConferenceAdded(ConferenceId),
    /// The conference lost its last online participant
    ConferenceRemoved(ConferenceId),
    ConferenceStatusChanged {
        conference: ConferenceId,
        old: ConferenceStatus,
        new: ConferenceStatus,
    },
    ParticipantAdded {
        conference: ConferenceId,
        key: ParticipantKey,
        participant: ParticipantState,
    },
    ParticipantUpdated {
        conference: ConferenceId,
        key: ParticipantKey,
        participant: ParticipantState,
    },
    ParticipantRemoved {
        conference: ConferenceId,
        key: ParticipantKey,
        participant: ParticipantState,
    },
    IncomingCallAdded {
        provider: ProviderKey,
        call: IncomingCall,
    },
    IncomingCallRemoved {
        provider: ProviderKey,
        call: IncomingCall,
    },
    InCallChanged(InCallState),
    PrivacyMuteChanged(bool),
    DoNotDisturbChanged(bool),
    AutoAnswerChanged(bool),
}

/// An unanswered incoming call and the provider it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedIncomingCall {
    pub provider: ProviderKey,
    pub provider_name: String,
    pub call: IncomingCall,
}
