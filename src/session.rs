//! Streaming session state machine.
//!
//! [`StreamingSession`] owns the frame synchronizer and decides which
//! dialect it splits. It never touches the transport: every transition that
//! needs the board to do something returns the [`Command`] to write, and the
//! driver writes it.
//!
//! ```text
//!          init()              "Free RAM:"          start_streaming()
//!   Idle ─────────▶ AwaitingReady ─────────▶ Ready ─────────────────▶ Streaming
//!                        ▲                                              │    ▲
//!                        │ init()                       stop_streaming() │    │ start_streaming()
//!                        └────────────────────── Stopped ◀──────────────┘    │ (ready flag kept)
//!                                                   └────────────────────────┘
//! ```

use tracing::{debug, info, trace};

use crate::config::StreamConfig;
use crate::framing::{FrameSynchronizer, FramingMode};
use crate::protocol::{Command, READY_MARKER};
use crate::types::{Sample, SessionState, StreamStats};

/// Something the session extracted from buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// The ready line arrived; the session is now [`SessionState::Ready`]
    Ready,
    /// A decoded packet
    Sample(Sample),
}

/// Lifecycle state machine plus the byte accumulator it drives.
#[derive(Debug)]
pub struct StreamingSession {
    state: SessionState,
    ready: bool,
    streaming: bool,
    synchronizer: FrameSynchronizer,
    packets_decoded: u64,
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new(&StreamConfig::default())
    }
}

impl StreamingSession {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            state: SessionState::Idle,
            ready: false,
            streaming: false,
            synchronizer: FrameSynchronizer::new(config.end_marker, config.max_line_length),
            packets_decoded: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the ready handshake has completed since the last init.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn mode(&self) -> FramingMode {
        self.synchronizer.mode()
    }

    /// Reset the handshake and ask the board for its banner.
    ///
    /// Leaves streaming and switches to line mode; callers that were
    /// streaming should stop first so the board goes quiet.
    pub fn init(&mut self) -> Command {
        self.ready = false;
        self.streaming = false;
        self.synchronizer.set_mode(FramingMode::Line);
        self.transition(SessionState::AwaitingReady);
        Command::Init
    }

    /// Enter binary streaming.
    ///
    /// Returns `None`, changing nothing, unless the handshake has completed
    /// and the session is not already streaming.
    pub fn start_streaming(&mut self) -> Option<Command> {
        if !self.ready || self.streaming {
            debug!(state = ?self.state, ready = self.ready, "start_streaming ignored");
            return None;
        }
        self.streaming = true;
        self.synchronizer.set_mode(FramingMode::Raw);
        self.transition(SessionState::Streaming);
        Some(Command::StartStreaming)
    }

    /// Leave streaming. Valid from any state; always yields the stop command.
    pub fn stop_streaming(&mut self) -> Command {
        self.streaming = false;
        self.synchronizer.set_mode(FramingMode::Line);
        self.transition(SessionState::Stopped);
        Command::StopStreaming
    }

    /// Buffer bytes that arrived from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.synchronizer.extend(data);
    }

    /// Extract the next meaningful item from the buffered bytes.
    ///
    /// In line mode, lines are consumed until the ready line appears; other
    /// lines are only logged. In raw mode each call decodes at most one frame.
    /// Returns `None` once nothing more can be extracted without new bytes.
    pub fn poll(&mut self) -> Option<SessionOutput> {
        match self.synchronizer.mode() {
            FramingMode::Line => {
                while let Some(line) = self.synchronizer.next_line() {
                    info!(line = %line, "Board line");
                    if self.on_line(&line) {
                        return Some(SessionOutput::Ready);
                    }
                }
                None
            }
            FramingMode::Raw => {
                let frame = self.synchronizer.next_frame()?;
                self.packets_decoded += 1;
                trace!(id = frame.id(), "Frame decoded");
                Some(SessionOutput::Sample(frame.decode()))
            }
        }
    }

    /// Clear the drop counter after the watchdog acted on it.
    pub fn reset_packets_dropped(&mut self) {
        self.synchronizer.reset_packets_dropped();
    }

    pub fn packets_dropped(&self) -> u64 {
        self.synchronizer.packets_dropped()
    }

    /// Session counters; driver-level counters are left at zero.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            skipped_bytes: self.synchronizer.skipped_bytes(),
            packets_dropped: self.synchronizer.packets_dropped(),
            packets_decoded: self.packets_decoded,
            ..StreamStats::default()
        }
    }

    fn on_line(&mut self, line: &str) -> bool {
        if self.ready || !line.trim().contains(READY_MARKER) {
            return false;
        }
        self.ready = true;
        // A stop while waiting for the banner keeps the session Stopped.
        if self.state == SessionState::AwaitingReady || self.state == SessionState::Idle {
            self.transition(SessionState::Ready);
        }
        true
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Session state change");
            self.state = next;
        }
    }
}
