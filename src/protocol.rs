//! Wire constants for the OpenBCI V3 board.
//!
//! Every binary packet on the wire has the same fixed layout:
//!
//! ```text
//! [0xA0][id][channel data: 8 x 3 bytes][aux data: 3 x 2 bytes][0xC0]
//! ```
//!
//! for a total of 33 bytes. All multi-byte values are big-endian.

/// First byte of every binary packet.
pub const START_BYTE: u8 = 0xA0;

/// Last byte of every binary packet.
pub const END_BYTE: u8 = 0xC0;

/// Number of EEG channels per sample.
pub const EEG_CHANNELS: usize = 8;

/// Number of auxiliary (accelerometer) channels per sample.
pub const AUX_CHANNELS: usize = 3;

/// Bytes per EEG channel value (signed 24-bit).
pub const CHANNEL_VALUE_LEN: usize = 3;

/// Bytes per auxiliary value (signed 16-bit).
pub const AUX_VALUE_LEN: usize = 2;

/// Bytes between the two markers: id, channel data and aux data.
pub const PAYLOAD_LENGTH: usize =
    1 + EEG_CHANNELS * CHANNEL_VALUE_LEN + AUX_CHANNELS * AUX_VALUE_LEN;

/// Total packet length including both markers.
pub const PACKET_LENGTH: usize = 1 + PAYLOAD_LENGTH + 1;

/// Nominal sample rate of the board in Hz.
pub const SAMPLE_RATE_HZ: f64 = 250.0;

/// Substring of the boot banner line that signals the board is ready.
pub const READY_MARKER: &str = "Free RAM:";

/// Reference voltage of the ADS1299, in volts.
pub const ADS1299_VREF: f64 = 4.5;

/// PGA gain the firmware configures on every channel.
pub const ADS1299_GAIN: f64 = 24.0;

/// Microvolts per ADC count.
pub const SCALE_UV_PER_COUNT: f64 =
    ADS1299_VREF / ((1u32 << 23) - 1) as f64 / ADS1299_GAIN * 1_000_000.0;

/// g per accelerometer count (LIS3DH at +/-4 g, 2 mg per count, left aligned by 4 bits).
pub const SCALE_G_PER_COUNT: f64 = 0.002 / 16.0;

/// Single-byte commands understood by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Soft reset; the board answers with its boot banner.
    Init,
    /// Begin binary streaming.
    StartStreaming,
    /// Stop binary streaming.
    StopStreaming,
}

impl Command {
    /// Byte written to the transport for this command.
    pub const fn as_byte(self) -> u8 {
        match self {
            Command::Init => b'v',
            Command::StartStreaming => b'b',
            Command::StopStreaming => b's',
        }
    }

    /// Parse a command byte received by a board emulator.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'v' => Some(Command::Init),
            b'b' => Some(Command::StartStreaming),
            b's' => Some(Command::StopStreaming),
            _ => None,
        }
    }
}
