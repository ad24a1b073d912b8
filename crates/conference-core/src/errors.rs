//! Error types for the conference core
//!
//! Errors fall into a few classes: parse errors for device tokens the core
//! does not understand, unknown-entity errors for commands that race with
//! status, invariant violations raised by callers, and configuration errors.
//! Only parse entry points and invariant checks return these to callers; the
//! command surface logs and swallows them.

use thiserror::Error;

use crate::types::CallId;

/// Result type for conference core operations
pub type Result<T> = std::result::Result<T, ConferenceError>;

/// Errors that can occur in the conference core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConferenceError {
    /// A status fragment carried an enum token with no known mapping
    #[error("Unrecognized {kind} token: '{token}'")]
    UnrecognizedToken { kind: &'static str, token: String },

    /// A fragment was structurally unusable (missing id, bad JSON/XML, ...)
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    /// A command referenced a call the aggregator does not know
    #[error("Call not found: {0}")]
    CallNotFound(CallId),

    /// A registry lookup found no matching provider
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// No registered provider can take a dial request
    #[error("No dialing provider available for {0}")]
    NoDialingProvider(String),

    /// A caller broke an API contract
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The command sink refused a command
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Configuration could not be loaded or applied
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConferenceError {
    /// Create an unrecognized token error
    pub fn unrecognized(kind: &'static str, token: impl Into<String>) -> Self {
        Self::UnrecognizedToken {
            kind,
            token: token.into(),
        }
    }

    /// Create a malformed fragment error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFragment(message.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a command failure error
    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is a parse failure for a single field
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::UnrecognizedToken { .. })
    }
}

impl From<serde_json::Error> for ConferenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFragment(err.to_string())
    }
}

impl From<quick_xml::Error> for ConferenceError {
    fn from(err: quick_xml::Error) -> Self {
        Self::MalformedFragment(err.to_string())
    }
}

impl From<toml::de::Error> for ConferenceError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
