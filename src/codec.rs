// Line codec for the LMS command-line interface (the "telnet" port)
// Handles the format: <space separated, URL-encoded tokens>\n

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Longest notification line we are willing to buffer.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

pub struct EventLineCodec {
    // Current parsing state
    state: EventLineCodecState,
    max_length: usize,
}

enum EventLineCodecState {
    // Accumulating bytes until the next newline
    ReadingLine { scanned: usize },
    // Current line exceeded max_length, dropping bytes up to its newline
    Discarding,
}

impl Default for EventLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            state: EventLineCodecState::ReadingLine { scanned: 0 },
            max_length,
        }
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for EventLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &mut self.state {
                EventLineCodecState::ReadingLine { scanned } => {
                    // Only look at bytes we haven't scanned yet
                    let start = (*scanned).min(buf.len());
                    if let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
                        let newline_pos = start + offset;
                        let line = buf.split_to(newline_pos + 1);
                        self.state = EventLineCodecState::ReadingLine { scanned: 0 };
                        return Ok(Some(to_line(&line[..line.len() - 1])));
                    }

                    if buf.len() > self.max_length {
                        warn!(
                            "Discarding event line longer than {} bytes",
                            self.max_length
                        );
                        buf.clear();
                        self.state = EventLineCodecState::Discarding;
                        continue;
                    }

                    // Not enough data for a full line
                    *scanned = buf.len();
                    return Ok(None);
                }

                EventLineCodecState::Discarding => {
                    if let Some(newline_pos) = buf.iter().position(|&b| b == b'\n') {
                        let _ = buf.split_to(newline_pos + 1);
                        self.state = EventLineCodecState::ReadingLine { scanned: 0 };
                        continue;
                    }
                    buf.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        // A final unterminated line is still a line
        match self.state {
            EventLineCodecState::ReadingLine { .. } if !buf.is_empty() => {
                let rest = buf.split_to(buf.len());
                self.state = EventLineCodecState::ReadingLine { scanned: 0 };
                Ok(Some(to_line(&rest)))
            }
            _ => {
                buf.clear();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_and_strips_carriage_return() {
        let mut codec = EventLineCodec::new();
        let mut buf = BytesMut::from(&b"a%3Ab playlist newsong X 1\r\nsecond"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("a%3Ab playlist newsong X 1")
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" line\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("second line"));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_line_is_dropped_and_stream_recovers() {
        let mut codec = EventLineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tail\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn unterminated_final_line_is_emitted_at_eof() {
        let mut codec = EventLineCodec::new();
        let mut buf = BytesMut::from(&b"playlist newsong last"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("playlist newsong last")
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
