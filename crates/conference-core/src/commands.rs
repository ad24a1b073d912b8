//! Outbound device commands
//!
//! The core only builds the logical command (a verb plus named parameters).
//! Formatting it into a vendor command string and writing it to the device
//! is the job of whatever implements [`CommandSink`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::{ConferenceError, Result};
use crate::types::{CallId, CallType, DialProtocol};

/// Logical command for a conferencing device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    Dial {
        number: String,
        protocol: DialProtocol,
        call_type: CallType,
        password: Option<String>,
    },
    Accept { call_id: CallId },
    Reject { call_id: CallId },
    Hold { call_id: CallId },
    Resume { call_id: CallId },
    Disconnect { call_id: CallId },
    Join { call_id: CallId, other_call_id: CallId },
    SendDtmf { call_id: CallId, digits: String },
    SetPrivacyMute { enabled: bool },
    SetDoNotDisturb { enabled: bool },
    SetAutoAnswer { enabled: bool },
}

impl DeviceCommand {
    pub fn verb(&self) -> &'static str {
        match self {
            DeviceCommand::Dial { .. } => "dial",
            DeviceCommand::Accept { .. } => "accept",
            DeviceCommand::Reject { .. } => "reject",
            DeviceCommand::Hold { .. } => "hold",
            DeviceCommand::Resume { .. } => "resume",
            DeviceCommand::Disconnect { .. } => "disconnect",
            DeviceCommand::Join { .. } => "join",
            DeviceCommand::SendDtmf { .. } => "send-dtmf",
            DeviceCommand::SetPrivacyMute { .. } => "set-mute",
            DeviceCommand::SetDoNotDisturb { .. } => "set-dnd",
            DeviceCommand::SetAutoAnswer { .. } => "set-auto-answer",
        }
    }

    /// Named parameters in a stable order
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            DeviceCommand::Dial {
                number,
                protocol,
                call_type,
                password,
            } => {
                let mut params = vec![
                    ("number", number.clone()),
                    ("protocol", protocol.to_string()),
                    ("call-type", call_type.to_string()),
                ];
                if let Some(password) = password {
                    params.push(("password", password.clone()));
                }
                params
            }
            DeviceCommand::Accept { call_id }
            | DeviceCommand::Reject { call_id }
            | DeviceCommand::Hold { call_id }
            | DeviceCommand::Resume { call_id }
            | DeviceCommand::Disconnect { call_id } => vec![("call-id", call_id.to_string())],
            DeviceCommand::Join {
                call_id,
                other_call_id,
            } => vec![
                ("call-id", call_id.to_string()),
                ("other-call-id", other_call_id.to_string()),
            ],
            DeviceCommand::SendDtmf { call_id, digits } => {
                vec![("call-id", call_id.to_string()), ("digits", digits.clone())]
            }
            DeviceCommand::SetPrivacyMute { enabled }
            | DeviceCommand::SetDoNotDisturb { enabled }
            | DeviceCommand::SetAutoAnswer { enabled } => vec![("enabled", enabled.to_string())],
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())?;
        for (name, value) in self.params() {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

/// Destination for device commands.
///
/// Implementations must not call back into the aggregator that issued the
/// command.
pub trait CommandSink: Send + Sync {
    fn send_command(&self, command: DeviceCommand) -> Result<()>;
}

impl CommandSink for mpsc::UnboundedSender<DeviceCommand> {
    fn send_command(&self, command: DeviceCommand) -> Result<()> {
        self.send(command)
            .map_err(|e| ConferenceError::command_failed(format!("command channel closed: {}", e.0)))
    }
}
