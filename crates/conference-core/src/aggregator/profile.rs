//! Device capability profiles

use serde::{Deserialize, Serialize};

use crate::types::{CallTypes, DialContext, DialProtocol, DialingSupport};

/// What a device can do, as far as the conference core is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Name used in logs and registrations
    pub name: String,
    pub supported_call_types: CallTypes,
    /// Support level per requested protocol; unlisted protocols are unsupported
    pub protocol_support: Vec<(DialProtocol, DialingSupport)>,
    /// Protocol used when a dial request does not name one
    pub default_protocol: DialProtocol,
    /// The device can hold calls (online calls are held before dialing)
    pub supports_hold: bool,
    /// The device can merge two calls
    pub supports_join: bool,
    /// The device reports its do-not-disturb state
    pub reports_do_not_disturb: bool,
    /// The device reports its auto-answer setting
    pub reports_auto_answer: bool,
}

impl ProviderProfile {
    /// A Cisco style codec: SIP native, PSTN through a gateway, holds and joins
    pub fn cisco(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported_call_types: CallTypes::AUDIO_VIDEO,
            protocol_support: vec![
                (DialProtocol::Sip, DialingSupport::Native),
                (DialProtocol::Pstn, DialingSupport::Supported),
                (DialProtocol::Unknown, DialingSupport::Unknown),
            ],
            default_protocol: DialProtocol::Sip,
            supports_hold: true,
            supports_join: true,
            reports_do_not_disturb: true,
            reports_auto_answer: true,
        }
    }

    /// A Zoom Room: meetings only, no hold or join, and only the microphone
    /// mute is reported back
    pub fn zoom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported_call_types: CallTypes::VIDEO,
            protocol_support: vec![
                (DialProtocol::Zoom, DialingSupport::Native),
                (DialProtocol::ZoomContact, DialingSupport::Native),
                (DialProtocol::Unknown, DialingSupport::Unknown),
            ],
            default_protocol: DialProtocol::Zoom,
            supports_hold: false,
            supports_join: false,
            reports_do_not_disturb: false,
            reports_auto_answer: false,
        }
    }

    pub fn support_for(&self, protocol: DialProtocol) -> DialingSupport {
        self.protocol_support
            .iter()
            .find(|(candidate, _)| *candidate == protocol)
            .map(|(_, support)| *support)
            .unwrap_or(DialingSupport::Unsupported)
    }

    /// Rank a dial request against this profile
    pub fn can_dial(&self, context: &DialContext) -> DialingSupport {
        if context.dial_string.trim().is_empty() {
            return DialingSupport::Unsupported;
        }
        let requested = CallTypes::from(context.call_type);
        if !requested.is_empty() && !self.supported_call_types.intersects(requested) {
            return DialingSupport::Unsupported;
        }
        self.support_for(context.protocol)
    }
}
