//! Logging setup
//!
//! The core logs through `tracing`; this module installs a subscriber for
//! applications that do not bring their own.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{ConferenceError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level, e.g. "info" or "debug"
    pub level: String,
    /// Extra filter directives, e.g. "roomcall_conference_core::devices=trace"
    pub directives: Vec<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    /// Log span enter/exit
    pub log_spans: bool,
    /// Room name for the startup message
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            directives: Vec::new(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "roomcall".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level.to_string().to_ascii_lowercase();
        self
    }

    /// Turn up one module, e.g. `with_directive("roomcall_conference_core::manager=debug")`
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Build the filter: `RUST_LOG` first, then the level, then the directives
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let level = parse_log_level(&self.level)?;
        self.directives
            .iter()
            .try_fold(EnvFilter::from_default_env().add_directive(level.into()), |filter, raw| {
                let directive: Directive = raw
                    .parse()
                    .map_err(|e| ConferenceError::config(format!("Invalid log directive '{}': {}", raw, e)))?;
                Ok(filter.add_directive(directive))
            })
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_span_events(if config.log_spans { FmtSpan::ACTIVE } else { FmtSpan::NONE })
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ConferenceError::config(format!("failed to install logger: {}", e)))?;

    tracing::info!(
        "{} conference core v{} logging at {}",
        config.app_name,
        env!("CARGO_PKG_VERSION"),
        config.level
    );
    Ok(())
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| ConferenceError::config(format!("Invalid log level: {}", level)))
}
