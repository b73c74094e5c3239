//! Line splitting for the text handshake

use tracing::warn;

use super::{FrameSynchronizer, FramingMode};

/// Longest accepted line unless configured otherwise.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16384;

impl FrameSynchronizer {
    /// Extract the next complete text line, without its terminator.
    ///
    /// Lines end at `\n`; a preceding `\r` is stripped. Returns `None` in raw
    /// mode or when no complete line is buffered. Bytes that are not valid
    /// UTF-8 are replaced rather than rejected, since the banner is only
    /// searched for a marker.
    ///
    /// A line longer than the configured maximum is discarded (and counted as
    /// skipped), whether or not its terminator has arrived yet.
    pub fn next_line(&mut self) -> Option<String> {
        if self.mode != FramingMode::Line {
            return None;
        }

        loop {
            let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_line_length {
                    warn!(
                        buffered = self.buffer.len(),
                        max = self.max_line_length,
                        "Line length exceeded, discarding"
                    );
                    self.skip(self.buffer.len());
                }
                return None;
            };

            if newline > self.max_line_length {
                warn!(length = newline, max = self.max_line_length, "Line length exceeded, discarding");
                self.skip(newline + 1);
                continue;
            }

            let line = self.buffer.split_to(newline + 1);
            let text = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            let text = text.strip_suffix(b"\r").unwrap_or(text);
            return Some(String::from_utf8_lossy(text).into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndMarkerPolicy;

    #[test]
    fn splits_crlf_and_lf_lines() {
        let mut sync = FrameSynchronizer::default();
        sync.extend(b"OpenBCI V3 8-16 channel\r\nOn Board ADS1299 Device ID: 0x3E\nFree RA");

        assert_eq!(sync.next_line().as_deref(), Some("OpenBCI V3 8-16 channel"));
        assert_eq!(sync.next_line().as_deref(), Some("On Board ADS1299 Device ID: 0x3E"));
        assert_eq!(sync.next_line(), None);

        sync.extend(b"M: 453\r\n");
        assert_eq!(sync.next_line().as_deref(), Some("Free RAM: 453"));
    }

    #[test]
    fn raw_mode_yields_no_lines() {
        let mut sync = FrameSynchronizer::default();
        sync.set_mode(FramingMode::Raw);
        sync.extend(b"hello\n");
        assert_eq!(sync.next_line(), None);
    }

    #[test]
    fn overlong_lines_are_discarded() {
        let mut sync = FrameSynchronizer::new(EndMarkerPolicy::TrustLength, 8);
        sync.extend(b"0123456789abc\nok\n");
        assert_eq!(sync.next_line().as_deref(), Some("ok"));
        assert_eq!(sync.skipped_bytes(), 14);

        sync.extend(b"an unterminated flood");
        assert_eq!(sync.next_line(), None);
        assert_eq!(sync.buffered(), 0);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut sync = FrameSynchronizer::default();
        sync.extend(&[0xFF, b'o', b'k', b'\n']);
        let line = sync.next_line().unwrap();
        assert!(line.ends_with("ok"));
    }
}
