//! Device capability traits
//!
//! The conference manager never sees device types. It works against the
//! narrow capabilities below; [`CallAggregator`] implements all of them.

use std::sync::Arc;

use crate::aggregator::{CallAggregator, CallEventHandler, IncomingCall};
use crate::errors::Result;
use crate::participant::ParticipantState;
use crate::types::{CallId, CallTypes, DialContext, DialingSupport};

/// Something that can originate calls
pub trait Dialable: Send + Sync {
    fn supported_call_types(&self) -> CallTypes;

    /// How well this device can handle the dial request
    fn can_dial(&self, context: &DialContext) -> DialingSupport;

    fn dial(&self, context: &DialContext) -> Result<()>;
}

/// Something with a privacy (microphone) mute
pub trait MuteCapable: Send + Sync {
    fn privacy_muted(&self) -> bool;

    /// Ask the device to change its mute; the cached value follows device status
    fn set_privacy_mute(&self, enabled: bool);
}

/// Something that can hold and resume calls
pub trait HoldCapable: Send + Sync {
    fn supports_hold(&self) -> bool;
    fn hold(&self, call_id: CallId);
    fn resume(&self, call_id: CallId);
}

/// A device registered with the conference manager
pub trait DialingProvider: Dialable + MuteCapable + HoldCapable {
    fn name(&self) -> &str;

    fn do_not_disturb(&self) -> bool;
    fn set_do_not_disturb(&self, enabled: bool);

    fn auto_answer(&self) -> bool;
    fn set_auto_answer(&self, enabled: bool);

    /// Active participants
    fn participants(&self) -> Vec<ParticipantState>;

    /// Unanswered incoming calls
    fn incoming_calls(&self) -> Vec<IncomingCall>;

    fn answer(&self, call_id: CallId);
    fn reject(&self, call_id: CallId);
    fn hangup_all(&self);

    fn add_event_handler(&self, name: &str, handler: Arc<dyn CallEventHandler>);
    fn remove_event_handler(&self, name: &str) -> bool;
}

impl Dialable for CallAggregator {
    fn supported_call_types(&self) -> CallTypes {
        self.profile().supported_call_types
    }

    fn can_dial(&self, context: &DialContext) -> DialingSupport {
        self.profile().can_dial(context)
    }

    fn dial(&self, context: &DialContext) -> Result<()> {
        self.dial_context(context)
    }
}

impl MuteCapable for CallAggregator {
    fn privacy_muted(&self) -> bool {
        CallAggregator::privacy_muted(self)
    }

    fn set_privacy_mute(&self, enabled: bool) {
        CallAggregator::set_privacy_mute(self, enabled)
    }
}

impl HoldCapable for CallAggregator {
    fn supports_hold(&self) -> bool {
        self.profile().supports_hold
    }

    fn hold(&self, call_id: CallId) {
        CallAggregator::hold(self, call_id)
    }

    fn resume(&self, call_id: CallId) {
        CallAggregator::resume(self, call_id)
    }
}

impl DialingProvider for CallAggregator {
    fn name(&self) -> &str {
        CallAggregator::name(self)
    }

    fn do_not_disturb(&self) -> bool {
        CallAggregator::do_not_disturb(self)
    }

    fn set_do_not_disturb(&self, enabled: bool) {
        CallAggregator::set_do_not_disturb(self, enabled)
    }

    fn auto_answer(&self) -> bool {
        CallAggregator::auto_answer(self)
    }

    fn set_auto_answer(&self, enabled: bool) {
        CallAggregator::set_auto_answer(self, enabled)
    }

    fn participants(&self) -> Vec<ParticipantState> {
        CallAggregator::participants(self)
    }

    fn incoming_calls(&self) -> Vec<IncomingCall> {
        CallAggregator::incoming_calls(self)
    }

    fn answer(&self, call_id: CallId) {
        CallAggregator::answer(self, call_id)
    }

    fn reject(&self, call_id: CallId) {
        CallAggregator::reject(self, call_id)
    }

    fn hangup_all(&self) {
        CallAggregator::hangup_all(self)
    }

    fn add_event_handler(&self, name: &str, handler: Arc<dyn CallEventHandler>) {
        CallAggregator::add_event_handler(self, name, handler)
    }

    fn remove_event_handler(&self, name: &str) -> bool {
        CallAggregator::remove_event_handler(self, name)
    }
}
