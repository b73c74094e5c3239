//! Error types for acquisition streaming.
//!
//! Framing problems (lost sync, incomplete frames, corrupted end markers) are
//! never errors: the frame synchronizer absorbs them as statistics and the
//! watchdog recovers from them. The errors in this module cover everything
//! around the core: transports, configuration, and the driver task itself.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: The serial link (or whatever stands in for it) failed
//! - **File Errors**: Reading a configuration file failed
//! - **Config Errors**: A configuration value is out of range
//! - **Parse Errors**: Configuration YAML could not be deserialized
//! - **Channel Errors**: The driver task is gone
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use openbci_stream::StreamError;
//!
//! let error = StreamError::transport_failed("serial port vanished");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Driver channel closed: {context}")]
    ChannelClosed { context: String },

    #[error("{feature} requires {requirement}")]
    Unsupported { feature: String, requirement: String },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Transport { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::File { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::Parse { .. } => false,
            StreamError::ChannelClosed { .. } => false,
            StreamError::Unsupported { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Transport { .. } => vec![
                "Check that the board is powered and the dongle is plugged in",
                "Verify the serial port name and baud rate",
                "Make sure no other process holds the port open",
            ],
            StreamError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            StreamError::Config { .. } => vec![
                "Check configuration values against their documented ranges",
                "Remove the offending key to fall back to the default",
            ],
            StreamError::Parse { .. } => vec![
                "Check the configuration file is valid YAML",
                "Verify field names and value types",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the board answers the init command",
            ],
            StreamError::ChannelClosed { .. } => vec![
                "The stream driver has stopped; reconnect to start a new one",
                "Inspect the shutdown result for the underlying transport error",
            ],
            StreamError::Unsupported { .. } => vec![
                "Enable the required crate feature",
                "Use an in-memory or custom transport instead",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        StreamError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for a closed driver channel.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        StreamError::ChannelClosed { context: context.into() }
    }

    /// Helper constructor for features compiled out of this build.
    pub fn unsupported(feature: impl Into<String>, requirement: impl Into<String>) -> Self {
        StreamError::Unsupported { feature: feature.into(), requirement: requirement.into() }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_yaml_ng::Error> for StreamError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StreamError::Parse { context: "configuration YAML".to_string(), details: err.to_string() }
    }
}
