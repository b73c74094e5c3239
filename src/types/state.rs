//! Session lifecycle state, events and diagnostics

use serde::{Deserialize, Serialize};

/// Lifecycle state of the board session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SessionState {
    /// Nothing sent to the board yet
    #[default]
    Idle,
    /// Init sent, waiting for the boot banner to report free memory
    AwaitingReady,
    /// Handshake complete; streaming can start
    Ready,
    /// Binary packets are being decoded
    Streaming,
    /// Streaming stopped; the board is still initialized
    Stopped,
}

impl SessionState {
    /// Whether binary packets are expected on the wire.
    pub fn is_streaming(self) -> bool {
        matches!(self, SessionState::Streaming)
    }
}

/// Notifications published by the driver as the session moves through its
/// lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SessionEvent {
    /// The board finished its boot banner
    Ready,
    /// Start command written, binary mode active
    StreamingStarted,
    /// Stop command written, line mode active
    StreamingStopped,
    /// The watchdog saw too many dropped packets and is restarting the stream
    Reconnecting { packets_dropped: u64 },
}

/// Cumulative diagnostics for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StreamStats {
    /// Bytes discarded while searching for a start marker
    pub skipped_bytes: u64,
    /// Frames detected as malformed since the last reconnect
    pub packets_dropped: u64,
    /// Samples handed to the chunk aggregator
    pub packets_decoded: u64,
    /// Chunks delivered to sinks
    pub chunks_emitted: u64,
    /// Reconnect sequences started by the watchdog
    pub reconnects: u64,
}
