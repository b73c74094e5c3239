//! In-memory simulated board.
//!
//! [`SimulatedBoard`] answers the same single-byte commands as real
//! hardware: `v` resets it and prints the boot banner, `b` starts 250 Hz
//! binary packets, `s` stops them. Faults can be injected at construction
//! time or while the board runs through its [`BoardProbe`], which also
//! records every command the driver wrote.

use bytes::{Bytes, BytesMut};
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, Interval, interval_at};
use tracing::{debug, trace};

use crate::protocol::{Command, SAMPLE_RATE_HZ, START_BYTE};
use crate::transport::Transport;
use crate::types::Sample;
use crate::Result;

/// Boot banner printed after a soft reset.
pub const BOOT_BANNER: &str = "OpenBCI V3 8-16 channel\r\n\
On Board ADS1299 Device ID: 0x3E\r\n\
LIS3DH Device ID: 0x33\r\n\
Firmware: v2.0.0\r\n\
Free RAM: 453\r\n\
$$$";

/// Counts per g on the accelerometer axes.
const COUNTS_PER_G: i16 = 8000;

#[derive(Debug, Default)]
struct ProbeState {
    commands: Vec<u8>,
    corrupt_next: u64,
    closed: bool,
    frames_sent: u64,
}

/// Handle for observing and disturbing a running [`SimulatedBoard`].
#[derive(Debug, Clone, Default)]
pub struct BoardProbe {
    state: Arc<Mutex<ProbeState>>,
    wake: Arc<Notify>,
}

impl BoardProbe {
    /// Every byte written to the board, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.with_state(|s| s.commands.clone()).unwrap_or_default()
    }

    /// How many times `command` was written.
    pub fn count(&self, command: Command) -> usize {
        self.commands().iter().filter(|&&b| b == command.as_byte()).count()
    }

    /// Send the next `frames` packets with a broken end marker.
    pub fn corrupt_next(&self, frames: u64) {
        self.with_state(|s| s.corrupt_next += frames);
    }

    /// Packets emitted so far.
    pub fn frames_sent(&self) -> u64 {
        self.with_state(|s| s.frames_sent).unwrap_or_default()
    }

    /// Unplug the board: the next read reports end of stream.
    pub fn close(&self) {
        self.with_state(|s| s.closed = true);
        self.wake.notify_one();
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ProbeState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }
}

/// A board that lives in memory and implements [`Transport`].
#[derive(Debug)]
pub struct SimulatedBoard {
    /// Bytes produced but not read yet
    outbox: BytesMut,
    streaming: bool,
    /// Paces packets while streaming
    ticker: Option<Interval>,
    period: Duration,
    next_id: u8,
    samples_generated: u64,
    corrupt_every: Option<u64>,
    garbage_every: Option<(u64, usize)>,
    probe: BoardProbe,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBoard {
    /// A well-behaved board sending packets at the native rate.
    pub fn new() -> Self {
        Self {
            outbox: BytesMut::new(),
            streaming: false,
            ticker: None,
            period: Duration::from_micros((1_000_000.0 / SAMPLE_RATE_HZ) as u64),
            next_id: 0,
            samples_generated: 0,
            corrupt_every: None,
            garbage_every: None,
            probe: BoardProbe::default(),
        }
    }

    /// Break the end marker of every `n`th packet.
    pub fn with_corruption_every(mut self, n: u64) -> Self {
        self.corrupt_every = Some(n.max(1));
        self
    }

    /// Insert `len` bytes of line noise after every `n`th packet.
    pub fn with_garbage_every(mut self, n: u64, len: usize) -> Self {
        self.garbage_every = Some((n.max(1), len));
        self
    }

    /// Handle shared with the running board.
    pub fn probe(&self) -> BoardProbe {
        self.probe.clone()
    }

    /// The sample the board will send as packet number `index`.
    ///
    /// Each channel carries a sine at `channel + 1` Hz; the accelerometer
    /// reads 1 g on z.
    pub fn sample_at(index: u64) -> Sample {
        let t = index as f64 / SAMPLE_RATE_HZ;
        let mut channel_data = [0i32; 8];
        for (channel, value) in channel_data.iter_mut().enumerate() {
            let frequency = (channel + 1) as f64;
            *value = ((TAU * frequency * t).sin() * 50_000.0) as i32;
        }
        Sample { id: (index % 256) as u8, channel_data, aux_data: [0, 0, COUNTS_PER_G] }
    }

    fn on_command(&mut self, byte: u8) {
        match Command::from_byte(byte) {
            Some(Command::Init) => {
                debug!("Simulated board reset");
                self.streaming = false;
                self.ticker = None;
                self.next_id = 0;
                self.outbox.extend_from_slice(BOOT_BANNER.as_bytes());
            }
            Some(Command::StartStreaming) => {
                debug!("Simulated board streaming");
                self.streaming = true;
                self.ticker = Some(interval_at(Instant::now() + self.period, self.period));
            }
            Some(Command::StopStreaming) => {
                debug!("Simulated board stopped");
                self.streaming = false;
                self.ticker = None;
            }
            None => trace!(byte, "Simulated board ignoring byte"),
        }
    }

    fn emit_packet(&mut self) {
        let index = self.samples_generated;
        self.samples_generated += 1;

        let mut sample = Self::sample_at(index);
        sample.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let mut packet = sample.to_packet();

        let forced = self.probe.with_state(|s| {
            s.frames_sent += 1;
            let forced = s.corrupt_next > 0;
            s.corrupt_next = s.corrupt_next.saturating_sub(1);
            forced
        });
        let scheduled = self.corrupt_every.is_some_and(|n| (index + 1) % n == 0);
        if forced.unwrap_or(false) || scheduled {
            packet[packet.len() - 1] = 0x00;
        }
        self.outbox.extend_from_slice(&packet);

        if let Some((n, len)) = self.garbage_every {
            if (index + 1) % n == 0 {
                self.outbox.extend((0..len).map(|i| match (i as u8).wrapping_mul(29) {
                    START_BYTE => 0x20,
                    b => b,
                }));
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.probe.with_state(|s| s.closed).unwrap_or(true)
    }
}

#[async_trait::async_trait]
impl Transport for SimulatedBoard {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.is_closed() {
                return Ok(None);
            }
            if !self.outbox.is_empty() {
                return Ok(Some(self.outbox.split().freeze()));
            }
            let wake = Arc::clone(&self.probe.wake);
            match self.ticker.as_mut() {
                // Interval::tick is cancel safe and the packet is built after
                // the await, so a dropped read never loses one.
                Some(ticker) => {
                    let ticked = tokio::select! {
                        _ = ticker.tick() => true,
                        _ = wake.notified() => false,
                    };
                    if ticked {
                        self.emit_packet();
                    }
                }
                // Silent until a command arrives through write() or the
                // probe unplugs the board.
                None => wake.notified().await,
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(crate::StreamError::transport_failed("simulated board unplugged"));
        }
        self.probe.with_state(|s| s.commands.extend_from_slice(data));
        for &byte in data {
            self.on_command(byte);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}
