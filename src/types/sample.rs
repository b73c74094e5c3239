//! Decoded samples and their unit conversion

use serde::{Deserialize, Serialize};

use crate::protocol::{
    AUX_CHANNELS, AUX_VALUE_LEN, CHANNEL_VALUE_LEN, EEG_CHANNELS, END_BYTE, PACKET_LENGTH,
    PAYLOAD_LENGTH, SCALE_G_PER_COUNT, SCALE_UV_PER_COUNT, START_BYTE,
};

const CHANNEL_DATA_START: usize = 1;
const AUX_DATA_START: usize = CHANNEL_DATA_START + EEG_CHANNELS * CHANNEL_VALUE_LEN;

/// One decoded acquisition reading.
///
/// Values are raw ADC counts. Use [`Sample::scaled`] for physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Sample {
    /// Packet counter assigned by the board (wraps at 255)
    pub id: u8,
    /// EEG channel values, sign-extended from 24 bits
    pub channel_data: [i32; EEG_CHANNELS],
    /// Accelerometer values
    pub aux_data: [i16; AUX_CHANNELS],
}

impl Sample {
    /// Decode a packet payload (the bytes between the start and end markers).
    ///
    /// Decoding only reinterprets bytes and cannot fail for a payload of the
    /// right length.
    pub fn decode(payload: &[u8; PAYLOAD_LENGTH]) -> Self {
        let mut channel_data = [0i32; EEG_CHANNELS];
        for (channel, value) in channel_data.iter_mut().enumerate() {
            let at = CHANNEL_DATA_START + channel * CHANNEL_VALUE_LEN;
            *value = decode_i24([payload[at], payload[at + 1], payload[at + 2]]);
        }

        let mut aux_data = [0i16; AUX_CHANNELS];
        for (channel, value) in aux_data.iter_mut().enumerate() {
            let at = AUX_DATA_START + channel * AUX_VALUE_LEN;
            *value = i16::from_be_bytes([payload[at], payload[at + 1]]);
        }

        Self { id: payload[0], channel_data, aux_data }
    }

    /// Encode this sample as a complete wire packet, markers included.
    ///
    /// Channel values outside the signed 24-bit range are truncated to their
    /// low 24 bits, as the board would.
    pub fn to_packet(&self) -> [u8; PACKET_LENGTH] {
        let mut packet = [0u8; PACKET_LENGTH];
        packet[0] = START_BYTE;
        packet[1] = self.id;

        for (channel, value) in self.channel_data.iter().enumerate() {
            let at = 1 + CHANNEL_DATA_START + channel * CHANNEL_VALUE_LEN;
            packet[at..at + CHANNEL_VALUE_LEN].copy_from_slice(&encode_i24(*value));
        }

        for (channel, value) in self.aux_data.iter().enumerate() {
            let at = 1 + AUX_DATA_START + channel * AUX_VALUE_LEN;
            packet[at..at + AUX_VALUE_LEN].copy_from_slice(&value.to_be_bytes());
        }

        packet[PACKET_LENGTH - 1] = END_BYTE;
        packet
    }

    /// Convert counts to microvolts and g.
    pub fn scaled(&self) -> ScaledSample {
        ScaledSample {
            id: self.id,
            channel_data: self.channel_data.map(|count| count as f64 * SCALE_UV_PER_COUNT),
            aux_data: self.aux_data.map(|count| count as f64 * SCALE_G_PER_COUNT),
        }
    }
}

/// A [`Sample`] converted to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ScaledSample {
    /// Packet counter assigned by the board
    pub id: u8,
    /// EEG channel values in microvolts
    pub channel_data: [f64; EEG_CHANNELS],
    /// Accelerometer values in g
    pub aux_data: [f64; AUX_CHANNELS],
}

/// Sign-extend a big-endian 24-bit two's-complement value.
pub fn decode_i24(bytes: [u8; 3]) -> i32 {
    let prefix = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    i32::from_be_bytes([prefix, bytes[0], bytes[1], bytes[2]])
}

/// Low 24 bits of `value`, big-endian.
pub fn encode_i24(value: i32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}
