//! Device bindings
//!
//! Each binding parses one vendor's status stream into the core types and
//! feeds a [`CallAggregator`](crate::aggregator::CallAggregator). Transport
//! and command formatting stay outside the core.

pub mod cisco;
pub mod zoom;

pub use cisco::{parse_call_fragment, CallFragment, CiscoCodec, StatusNode};
pub use zoom::{ZoomMessage, ZoomRoom};

use crate::errors::{ConferenceError, Result};

/// Parse an on/off style token as reported by either device family
pub(crate) fn parse_toggle(token: &str) -> Result<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "active" | "enabled" => Ok(true),
        "off" | "false" | "inactive" | "disabled" => Ok(false),
        _ => Err(ConferenceError::unrecognized("toggle", token)),
    }
}
