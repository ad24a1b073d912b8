//! # Roomcall Conference Core
//!
//! Call state tracking and room-wide conference orchestration for
//! conferencing codecs.
//!
//! Devices push partial, asynchronous status updates. This crate reconciles
//! them into per-call state machines, merges the calls of every device into
//! one conference view and keeps room policy in sync across devices.
//!
//! ## Architecture
//!
//! - `dispatch`: path-keyed routing of status fragments to parsers
//! - `participant`: per-call state machine and the shared name cache
//! - `aggregator`: per-device call set, incoming calls, auto-join, device toggles
//! - `manager`: provider registries, conferences, history and policy
//! - `devices`: Cisco (XML) and Zoom Room (JSON) bindings
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomcall_conference_core::{
//!     AggregatorConfig, CallAggregator, CallTypes, CiscoCodec, ConferenceConfig,
//!     ConferenceManager, ProviderProfile, StatusDispatchRegistry,
//! };
//!
//! # fn main() -> roomcall_conference_core::Result<()> {
//! let manager = ConferenceManager::new(ConferenceConfig::default());
//!
//! let (commands, _device_rx) = tokio::sync::mpsc::unbounded_channel();
//! let codec = CallAggregator::new(
//!     ProviderProfile::cisco("codec"),
//!     AggregatorConfig::default(),
//!     Arc::new(commands),
//!     manager.name_cache(),
//! );
//! let feedback = CiscoCodec::new(codec.clone(), Arc::new(StatusDispatchRegistry::new()));
//! manager.register_dialing_provider(CallTypes::AUDIO_VIDEO, codec);
//!
//! feedback.handle_feedback(r#"<XmlDoc><Status><Call item="1"><Status>Dialling</Status></Call></Status></XmlDoc>"#)?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod commands;
pub mod conference;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod errors;
pub mod history;
pub mod logging;
pub mod manager;
pub mod participant;
pub mod provider;
pub mod types;

pub use aggregator::{CallAggregator, CallEvent, CallEventHandler, IncomingCall, ProviderProfile};
pub use commands::{CommandSink, DeviceCommand};
pub use conference::{Conference, ConferenceId, ConferenceStatus, ParticipantKey, ProviderKey};
pub use config::{AggregatorConfig, ConferenceConfig, RoomConfig};
pub use devices::{CiscoCodec, StatusNode, ZoomMessage, ZoomRoom};
pub use dispatch::{StatusCallback, StatusCategory, StatusDispatchRegistry, StatusKey};
pub use errors::{ConferenceError, Result};
pub use history::ScrollQueue;
pub use logging::{setup_logging, LoggingConfig};
pub use manager::{ConferenceManager, ConferenceManagerEvent, ManagedIncomingCall};
pub use participant::{NameCache, ParticipantChange, ParticipantState, ParticipantUpdate};
pub use provider::{Dialable, DialingProvider, HoldCapable, MuteCapable};
pub use types::{
    AnswerState, CallDirection, CallId, CallType, CallTypes, DialContext, DialProtocol, DialingSupport,
    InCallState, ParticipantStatus,
};
