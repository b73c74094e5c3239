//! Core types for decoded acquisition data.
//!
//! ## Architecture
//!
//! - [`Sample`] is one decoded packet: id, eight 24-bit EEG channels and three
//!   16-bit accelerometer channels, all as raw counts
//! - [`ScaledSample`] is the same reading in microvolts and g
//! - [`Chunk`] is a fixed-size batch of samples delivered to sinks
//! - [`SessionState`], [`SessionEvent`] and [`StreamStats`] describe the
//!   streaming lifecycle
//!
//! ## Usage Example
//!
//! ```rust
//! use openbci_stream::types::Sample;
//! use openbci_stream::protocol::PAYLOAD_LENGTH;
//!
//! let mut payload = [0u8; PAYLOAD_LENGTH];
//! payload[0] = 3;                                   // packet id
//! payload[1..4].copy_from_slice(&[0x80, 0x00, 0x00]); // first channel
//!
//! let sample = Sample::decode(&payload);
//! assert_eq!(sample.id, 3);
//! assert_eq!(sample.channel_data[0], -8_388_608);
//! ```

mod chunk;
mod sample;
mod state;

pub use chunk::Chunk;
pub use sample::{Sample, ScaledSample, decode_i24, encode_i24};
pub use state::{SessionEvent, SessionState, StreamStats};
