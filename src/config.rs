//! Stream configuration.
//!
//! Every field has a default matching the board's stock behaviour, so a
//! configuration file only needs the keys it wants to change:
//!
//! ```rust
//! use openbci_stream::StreamConfig;
//!
//! let config = StreamConfig::from_yaml_str("port: /dev/ttyUSB0\nchunk_size: 250\n").unwrap();
//! assert_eq!(config.chunk_size, 250);
//! assert_eq!(config.baud_rate, 115_200);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::framing::DEFAULT_MAX_LINE_LENGTH;
use crate::{Result, StreamError};

/// How the frame synchronizer treats the trailing byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum EndMarkerPolicy {
    /// Frames are delimited by the start marker and fixed length only; the
    /// trailing byte is never inspected.
    #[default]
    TrustLength,
    /// Frames whose trailing byte is not the end marker are dropped and
    /// counted, and scanning resumes right after the rejected start marker.
    Validate,
}

/// Configuration for a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Serial port identifier, used only by the serial transport
    pub port: String,
    /// Serial baud rate, used only by the serial transport
    pub baud_rate: u32,
    /// Samples per chunk delivered to sinks
    pub chunk_size: usize,
    /// Seconds between watchdog checks while streaming
    pub check_interval_secs: f64,
    /// Dropped packets tolerated before the watchdog reconnects
    pub max_packets_to_skip: u64,
    /// Delay before re-sending init during a reconnect
    pub reinit_delay_ms: u64,
    /// Delay before re-starting the stream during a reconnect
    pub restart_delay_ms: u64,
    /// Trailing-byte policy of the frame synchronizer
    pub end_marker: EndMarkerPolicy,
    /// Send init as soon as the driver starts
    pub init_on_connect: bool,
    /// Start streaming as soon as the board reports ready
    pub auto_start: bool,
    /// Cancel a pending reconnect when streaming is stopped by hand
    pub cancel_reconnect_on_stop: bool,
    /// Deliver a partial chunk when streaming is stopped by hand
    pub flush_on_stop: bool,
    /// Longest text line accepted during the handshake
    pub max_line_length: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            chunk_size: 125,
            check_interval_secs: 2.0,
            max_packets_to_skip: 10,
            reinit_delay_ms: 500,
            restart_delay_ms: 1000,
            end_marker: EndMarkerPolicy::TrustLength,
            init_on_connect: true,
            auto_start: true,
            cancel_reconnect_on_stop: true,
            flush_on_stop: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StreamConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check values the driver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::invalid_config("chunk_size must be at least 1"));
        }
        if !self.check_interval_secs.is_finite() || self.check_interval_secs <= 0.0 {
            return Err(StreamError::invalid_config(format!(
                "check_interval_secs must be a positive number, got {}",
                self.check_interval_secs
            )));
        }
        if self.restart_delay_ms <= self.reinit_delay_ms {
            return Err(StreamError::invalid_config(format!(
                "restart_delay_ms ({}) must be greater than reinit_delay_ms ({})",
                self.restart_delay_ms, self.reinit_delay_ms
            )));
        }
        if self.max_line_length == 0 {
            return Err(StreamError::invalid_config("max_line_length must be at least 1"));
        }
        if self.baud_rate == 0 {
            return Err(StreamError::invalid_config("baud_rate must be positive"));
        }
        Ok(())
    }

    /// Watchdog period.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval_secs)
    }

    /// Reconnect delay before init.
    pub fn reinit_delay(&self) -> Duration {
        Duration::from_millis(self.reinit_delay_ms)
    }

    /// Reconnect delay before start.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_secs = interval.as_secs_f64();
        self
    }

    pub fn with_max_packets_to_skip(mut self, max: u64) -> Self {
        self.max_packets_to_skip = max;
        self
    }

    pub fn with_end_marker(mut self, policy: EndMarkerPolicy) -> Self {
        self.end_marker = policy;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_init_on_connect(mut self, init_on_connect: bool) -> Self {
        self.init_on_connect = init_on_connect;
        self
    }

    pub fn with_flush_on_stop(mut self, flush_on_stop: bool) -> Self {
        self.flush_on_stop = flush_on_stop;
        self
    }

    pub fn with_cancel_reconnect_on_stop(mut self, cancel: bool) -> Self {
        self.cancel_reconnect_on_stop = cancel;
        self
    }
}
