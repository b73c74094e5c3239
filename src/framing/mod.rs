//! Frame synchronization over the raw byte stream.
//!
//! The board speaks two dialects on the same link. Before streaming it
//! prints text lines (the boot banner); while streaming it sends fixed-size
//! binary packets. [`FrameSynchronizer`] owns the bytes that arrived but were
//! not consumed yet and splits them according to its [`FramingMode`]:
//!
//! - [`FramingMode::Line`]: newline-terminated text, see [`FrameSynchronizer::next_line`]
//! - [`FramingMode::Raw`]: 33-byte packets, see [`FrameSynchronizer::next_frame`]
//!
//! Framing never depends on how the transport split the stream: feeding one
//! byte at a time yields exactly the frames that feeding everything at once
//! yields.
//!
//! ```rust
//! use openbci_stream::framing::{FrameSynchronizer, FramingMode};
//! use openbci_stream::types::Sample;
//!
//! let sample = Sample { id: 9, channel_data: [0; 8], aux_data: [0; 3] };
//! let mut sync = FrameSynchronizer::default();
//! sync.set_mode(FramingMode::Raw);
//!
//! sync.extend(b"noise");
//! sync.extend(&sample.to_packet());
//!
//! let frame = sync.next_frame().expect("one complete frame");
//! assert_eq!(frame.decode(), sample);
//! assert_eq!(sync.skipped_bytes(), 5);
//! assert!(sync.next_frame().is_none());
//! ```

mod lines;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::config::EndMarkerPolicy;
use crate::protocol::{END_BYTE, PACKET_LENGTH, PAYLOAD_LENGTH, START_BYTE};
use crate::types::Sample;

pub use lines::DEFAULT_MAX_LINE_LENGTH;

/// Which dialect the synchronizer is currently splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingMode {
    /// Text lines (handshake)
    #[default]
    Line,
    /// Binary packets (streaming)
    Raw,
}

/// One complete packet, both markers included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    bytes: [u8; PACKET_LENGTH],
}

impl RawFrame {
    /// Packet counter byte.
    pub fn id(&self) -> u8 {
        self.bytes[1]
    }

    /// Bytes between the start and end markers.
    pub fn payload(&self) -> [u8; PAYLOAD_LENGTH] {
        std::array::from_fn(|i| self.bytes[i + 1])
    }

    /// Trailing byte, which a well-formed frame sets to the end marker.
    pub fn end_marker(&self) -> u8 {
        self.bytes[PACKET_LENGTH - 1]
    }

    /// The full packet as received.
    pub fn as_bytes(&self) -> &[u8; PACKET_LENGTH] {
        &self.bytes
    }

    /// Decode the payload into a sample.
    pub fn decode(&self) -> Sample {
        Sample::decode(&self.payload())
    }
}

/// Splits accumulated transport bytes into lines or packets.
#[derive(Debug)]
pub struct FrameSynchronizer {
    /// Bytes received but not consumed yet
    buffer: BytesMut,
    mode: FramingMode,
    policy: EndMarkerPolicy,
    /// Offset of the start marker committed to, if any
    packet_start: Option<usize>,
    max_line_length: usize,
    skipped_bytes: u64,
    packets_dropped: u64,
    /// Buffered bytes still covered by the last frame counted as dropped
    rejected_span: usize,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new(EndMarkerPolicy::default(), DEFAULT_MAX_LINE_LENGTH)
    }
}

impl FrameSynchronizer {
    /// Create a synchronizer in line mode.
    pub fn new(policy: EndMarkerPolicy, max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * PACKET_LENGTH),
            mode: FramingMode::Line,
            policy,
            packet_start: None,
            max_line_length: max_line_length.max(1),
            skipped_bytes: 0,
            packets_dropped: 0,
            rejected_span: 0,
        }
    }

    /// Append bytes in arrival order.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Switch dialect.
    ///
    /// Entering raw mode keeps whatever text was not consumed as lines; it is
    /// scanned for a start marker like any other byte. Entering line mode
    /// discards the binary tail, which can never be a complete frame again.
    pub fn set_mode(&mut self, mode: FramingMode) {
        if self.mode == mode {
            return;
        }
        if mode == FramingMode::Line && !self.buffer.is_empty() {
            debug!(bytes = self.buffer.len(), "Discarding binary tail on switch to line mode");
            self.skip(self.buffer.len());
        }
        self.packet_start = None;
        self.mode = mode;
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Returns `None` in line mode, when no start marker is buffered, or when
    /// the committed frame is still incomplete. Call repeatedly until `None`
    /// to drain everything a single read delivered.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        if self.mode != FramingMode::Raw {
            return None;
        }

        loop {
            let start = match self.packet_start {
                Some(start) => start,
                None => match self.buffer.iter().position(|&b| b == START_BYTE) {
                    Some(start) => {
                        trace!(start, buffered = self.buffer.len(), "Start marker found");
                        self.packet_start = Some(start);
                        start
                    }
                    None => {
                        // No marker anywhere: none of these bytes can start a frame.
                        let skipped = self.buffer.len();
                        if skipped > 0 {
                            trace!(skipped, "No start marker in buffer");
                            self.skip(skipped);
                        }
                        return None;
                    }
                },
            };

            let end = start + PACKET_LENGTH;
            if self.buffer.len() < end {
                return None;
            }

            if self.policy == EndMarkerPolicy::Validate && self.buffer[end - 1] != END_BYTE {
                // A marker inside an already rejected frame is part of that frame.
                let new_drop = start >= self.rejected_span;
                debug!(
                    end_byte = self.buffer[end - 1],
                    new_drop,
                    packets_dropped = self.packets_dropped,
                    "Dropping frame with bad end marker"
                );
                self.skip(start + 1);
                if new_drop {
                    self.packets_dropped += 1;
                    self.rejected_span = PACKET_LENGTH - 1;
                }
                self.packet_start = None;
                continue;
            }

            let mut bytes = [0u8; PACKET_LENGTH];
            bytes.copy_from_slice(&self.buffer[start..end]);
            self.skip(start);
            self.advance(PACKET_LENGTH);
            self.packet_start = None;
            return Some(RawFrame { bytes });
        }
    }

    /// Bytes discarded while out of sync.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Frames detected as malformed since the last reset.
    ///
    /// Stray markers found while rescanning a rejected frame are rejected
    /// too, but count towards that frame rather than as new drops.
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    pub fn reset_packets_dropped(&mut self) {
        self.packets_dropped = 0;
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn skip(&mut self, count: usize) {
        self.skipped_bytes += count as u64;
        self.advance(count);
    }

    fn advance(&mut self, count: usize) {
        self.buffer.advance(count);
        self.rejected_span = self.rejected_span.saturating_sub(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_stream, sample_fixture};
    use proptest::prelude::*;

    fn raw(policy: EndMarkerPolicy) -> FrameSynchronizer {
        let mut sync = FrameSynchronizer::new(policy, DEFAULT_MAX_LINE_LENGTH);
        sync.set_mode(FramingMode::Raw);
        sync
    }

    fn drain(sync: &mut FrameSynchronizer) -> Vec<Sample> {
        std::iter::from_fn(|| sync.next_frame()).map(|f| f.decode()).collect()
    }

    #[test]
    fn single_frame_yields_one_sample_with_payload_id() {
        let sample = sample_fixture(200);
        let mut sync = raw(EndMarkerPolicy::TrustLength);
        sync.extend(&sample.to_packet());

        let frame = sync.next_frame().expect("frame");
        assert_eq!(frame.id(), 200);
        assert_eq!(frame.decode(), sample);
        assert!(sync.next_frame().is_none());
        assert_eq!(sync.buffered(), 0);
        assert_eq!(sync.skipped_bytes(), 0);
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let packet = sample_fixture(1).to_packet();
        let mut sync = raw(EndMarkerPolicy::TrustLength);

        sync.extend(&packet[..20]);
        assert!(sync.next_frame().is_none());
        assert_eq!(sync.buffered(), 20);

        sync.extend(&packet[20..]);
        assert_eq!(sync.next_frame().map(|f| f.id()), Some(1));
    }

    #[test]
    fn garbage_prefix_only_counts_as_skipped() {
        let garbage: Vec<u8> = (0u8..50).map(|b| b.wrapping_mul(3)).filter(|&b| b != START_BYTE).collect();
        let sample = sample_fixture(5);
        let mut sync = raw(EndMarkerPolicy::TrustLength);

        sync.extend(&garbage);
        assert!(sync.next_frame().is_none());
        sync.extend(&sample.to_packet());

        assert_eq!(drain(&mut sync), vec![sample]);
        assert_eq!(sync.skipped_bytes(), garbage.len() as u64);
    }

    #[test]
    fn one_read_can_hold_many_frames() {
        let samples: Vec<Sample> = (0..10).map(sample_fixture).collect();
        let mut sync = raw(EndMarkerPolicy::TrustLength);
        sync.extend(&build_stream(&samples));
        assert_eq!(drain(&mut sync), samples);
    }

    #[test]
    fn line_mode_yields_no_frames() {
        let mut sync = FrameSynchronizer::default();
        sync.extend(&sample_fixture(1).to_packet());
        assert!(sync.next_frame().is_none());
    }

    #[test]
    fn trust_length_accepts_bad_end_marker() {
        // Length-based framing never looks at the trailing byte.
        let sample = sample_fixture(3);
        let mut packet = sample.to_packet();
        packet[PACKET_LENGTH - 1] = 0x00;

        let mut sync = raw(EndMarkerPolicy::TrustLength);
        sync.extend(&packet);
        assert_eq!(drain(&mut sync), vec![sample]);
        assert_eq!(sync.packets_dropped(), 0);
    }

    #[test]
    fn validate_drops_bad_end_marker_and_resyncs() {
        let bad = sample_fixture(3);
        let good = sample_fixture(4);
        let mut corrupted = bad.to_packet();
        corrupted[PACKET_LENGTH - 1] = 0x00;

        let mut sync = raw(EndMarkerPolicy::Validate);
        sync.extend(&corrupted);
        sync.extend(&good.to_packet());

        assert_eq!(drain(&mut sync), vec![good]);
        assert_eq!(sync.packets_dropped(), 1);
    }

    #[test]
    fn stray_marker_in_rejected_frame_is_not_a_second_drop() {
        let mut corrupted = sample_fixture(3).to_packet();
        corrupted[10] = START_BYTE;
        corrupted[PACKET_LENGTH - 1] = 0x00;
        let good = sample_fixture(4);

        let mut sync = raw(EndMarkerPolicy::Validate);
        sync.extend(&corrupted);
        sync.extend(&good.to_packet());

        assert_eq!(drain(&mut sync), vec![good]);
        assert_eq!(sync.packets_dropped(), 1);
        // Every byte of the rejected frame, markers included, was skipped.
        assert_eq!(sync.skipped_bytes(), PACKET_LENGTH as u64);
    }

    #[test]
    fn back_to_back_rejected_frames_each_count_once() {
        let mut corrupted = sample_fixture(3).to_packet();
        corrupted[10] = START_BYTE;
        corrupted[PACKET_LENGTH - 1] = 0x00;
        let good = sample_fixture(4);

        let mut sync = raw(EndMarkerPolicy::Validate);
        sync.extend(&corrupted);
        sync.extend(&corrupted);
        sync.extend(&good.to_packet());

        assert_eq!(drain(&mut sync), vec![good]);
        assert_eq!(sync.packets_dropped(), 2);
        assert_eq!(sync.skipped_bytes(), 2 * PACKET_LENGTH as u64);
    }

    #[test]
    fn switching_to_line_mode_discards_binary_tail() {
        let packet = sample_fixture(1).to_packet();
        let mut sync = raw(EndMarkerPolicy::TrustLength);
        sync.extend(&packet[..10]);
        assert!(sync.next_frame().is_none());

        sync.set_mode(FramingMode::Line);
        assert_eq!(sync.buffered(), 0);
        assert_eq!(sync.skipped_bytes(), 10);

        // The stale candidate must not survive into the next stream.
        sync.set_mode(FramingMode::Raw);
        sync.extend(&packet);
        assert_eq!(sync.next_frame().map(|f| f.id()), Some(1));
    }

    #[test]
    fn dropped_counter_resets() {
        let mut corrupted = sample_fixture(1).to_packet();
        corrupted[PACKET_LENGTH - 1] = 0x00;

        let mut sync = raw(EndMarkerPolicy::Validate);
        sync.extend(&corrupted);
        sync.extend(&corrupted);
        assert!(sync.next_frame().is_none());
        assert_eq!(sync.packets_dropped(), 2);
        sync.reset_packets_dropped();
        assert_eq!(sync.packets_dropped(), 0);
    }

    fn arb_stream() -> impl Strategy<Value = Vec<u8>> {
        // Frames interleaved with noise, occasionally with corrupted tails.
        let piece = prop_oneof![
            (any::<u8>(), any::<[i16; 3]>(), any::<bool>()).prop_map(|(id, aux, corrupt)| {
                let mut packet = Sample { id, channel_data: [id as i32 - 128; 8], aux_data: aux }.to_packet();
                if corrupt {
                    packet[PACKET_LENGTH - 1] = 0x5A;
                }
                packet.to_vec()
            }),
            prop::collection::vec(any::<u8>(), 0..40),
        ];
        prop::collection::vec(piece, 0..12).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn prop_framing_is_independent_of_read_boundaries(
            stream in arb_stream(),
            splits in prop::collection::vec(1usize..64, 1..32),
            validate in any::<bool>()
        ) {
            let policy = if validate { EndMarkerPolicy::Validate } else { EndMarkerPolicy::TrustLength };

            let mut whole = raw(policy);
            whole.extend(&stream);
            let expected = drain(&mut whole);

            let mut byte_wise = raw(policy);
            let mut one_at_a_time = Vec::new();
            for byte in &stream {
                byte_wise.extend(std::slice::from_ref(byte));
                one_at_a_time.extend(drain(&mut byte_wise));
            }
            prop_assert_eq!(&one_at_a_time, &expected);

            let mut chunked = raw(policy);
            let mut split_reads = Vec::new();
            let mut rest = stream.as_slice();
            for size in splits.iter().cycle() {
                if rest.is_empty() {
                    break;
                }
                let (head, tail) = rest.split_at((*size).min(rest.len()));
                chunked.extend(head);
                split_reads.extend(drain(&mut chunked));
                rest = tail;
            }
            prop_assert_eq!(&split_reads, &expected);
            prop_assert_eq!(chunked.packets_dropped(), whole.packets_dropped());
        }
    }
}
