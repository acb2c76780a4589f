//! Incremental receive parser.
//!
//! Frames arrive as raw bytes with no alignment guarantee: the stream may
//! start mid-frame, carry corrupt octets, or stutter the sync sequence. The
//! parser consumes one byte at a time, hunting for the `BE EF` signature,
//! validating the additive header checksum, then collecting body and footer
//! into the single shared receive buffer.
//!
//! A ring of the last eight raw bytes is kept so that a header whose
//! checksum fails can be re-examined from its second byte: if the stream
//! actually contained a misaligned signature (for example `.. BE | BE EF ..`),
//! re-feeding the ring shifted by one recovers the true frame start. The
//! framer drives that backtrack through [`Parser::take_resync_window`].

use framelink_core::{
    constants::{HEADER_SIZE, SYNC_1, SYNC_2},
    ErrorKind,
};

use crate::{
    checksum::header_sum,
    packet::{
        Header, PacketBuffer, OFF_BODY_SIZE, OFF_CHECKSUM, OFF_DEST, OFF_KIND, OFF_SRC,
        OFF_TRANS_ID,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ParseState {
    Sig1,
    Sig2,
    Dest,
    Src,
    Kind,
    BodySize,
    TransId,
    Checksum,
    Body,
    Footer1,
    Footer2,
}

/// Terminal result of feeding a byte into the parser.
///
/// `BadSignature` never terminates a parse round; stray bytes are absorbed
/// while hunting and only show up through [`Parser::interim`] when the
/// stream runs dry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A full frame is assembled in the receive buffer: header
    /// checksum-valid, footer captured. Socket classification and the CRC
    /// compare are left to the framer.
    Complete,
    /// The header failed its additive checksum.
    BadHeaderChecksum,
    /// The advertised body size exceeds the configured budget.
    PacketTooLarge {
        /// Body size the header claimed.
        got: usize,
    },
}

/// Byte-at-a-time frame parser owning the shared receive buffer.
///
/// There is exactly one parser per node, not one per port; every packet
/// overwrites the same receive buffer, so payload borrows expire when the
/// next poll starts.
pub struct Parser {
    state: ParseState,
    /// Bytes of the body collected so far.
    body_cursor: usize,
    /// Budget the body-size field is checked against.
    max_body: usize,
    /// Latest non-terminal status, reported when the stream runs dry.
    interim: ErrorKind,
    /// Shared receive buffer; one frame at a time.
    buffer: PacketBuffer,
    /// Ring of the last `HEADER_SIZE` raw bytes fed.
    history: [u8; HEADER_SIZE],
    history_head: usize,
    history_len: usize,
}

impl Parser {
    /// Creates a parser whose receive buffer accepts bodies up to
    /// `max_body` bytes.
    pub fn new(max_body: usize) -> Self {
        let mut buffer = PacketBuffer::with_max_body(max_body);
        buffer.set_byte(0, SYNC_1);
        buffer.set_byte(1, SYNC_2);
        Self {
            state: ParseState::Sig1,
            body_cursor: 0,
            max_body,
            interim: ErrorKind::PartialPacket,
            buffer,
            history: [0; HEADER_SIZE],
            history_head: 0,
            history_len: 0,
        }
    }

    /// Feeds one byte. Returns a terminal outcome when a frame attempt
    /// completes, successfully or not; `None` while mid-frame or hunting.
    pub fn push(&mut self, byte: u8) -> Option<ParseOutcome> {
        self.history_push(byte);

        match self.state {
            ParseState::Sig1 => {
                self.interim = ErrorKind::PartialPacket;
                if byte == SYNC_1 {
                    self.state = ParseState::Sig2;
                } else {
                    self.interim = ErrorKind::BadSignature;
                }
                None
            }
            ParseState::Sig2 => {
                if byte == SYNC_2 {
                    self.state = ParseState::Dest;
                } else if byte == SYNC_1 {
                    // Stuttered sync byte; the later one may start the frame.
                } else {
                    self.interim = ErrorKind::BadSignature;
                    self.reset();
                }
                None
            }
            ParseState::Dest => {
                self.buffer.set_byte(OFF_DEST, byte);
                self.state = ParseState::Src;
                None
            }
            ParseState::Src => {
                self.buffer.set_byte(OFF_SRC, byte);
                self.state = ParseState::Kind;
                None
            }
            ParseState::Kind => {
                self.buffer.set_byte(OFF_KIND, byte);
                self.state = ParseState::BodySize;
                None
            }
            ParseState::BodySize => {
                self.buffer.set_byte(OFF_BODY_SIZE, byte);
                self.state = ParseState::TransId;
                None
            }
            ParseState::TransId => {
                self.buffer.set_byte(OFF_TRANS_ID, byte);
                self.state = ParseState::Checksum;
                None
            }
            ParseState::Checksum => {
                self.buffer.set_byte(OFF_CHECKSUM, byte);
                if byte != header_sum(&self.buffer.header_bytes()[..OFF_CHECKSUM]) {
                    self.reset();
                    return Some(ParseOutcome::BadHeaderChecksum);
                }
                self.interim = ErrorKind::PartialHeaderValid;
                let body_size = self.buffer.header().body_size as usize;
                if body_size > self.max_body {
                    self.reset();
                    return Some(ParseOutcome::PacketTooLarge { got: body_size });
                }
                self.body_cursor = 0;
                self.state = ParseState::Body;
                None
            }
            ParseState::Body => {
                let body_size = self.buffer.header().body_size as usize;
                if body_size == 0 {
                    // Empty body: this byte is already the first footer octet.
                    self.buffer.set_byte(HEADER_SIZE, byte);
                    self.state = ParseState::Footer2;
                    return None;
                }
                self.buffer.set_byte(HEADER_SIZE + self.body_cursor, byte);
                self.body_cursor += 1;
                if self.body_cursor >= body_size {
                    self.state = ParseState::Footer1;
                }
                None
            }
            ParseState::Footer1 => {
                let body_size = self.buffer.header().body_size as usize;
                self.buffer.set_byte(HEADER_SIZE + body_size, byte);
                self.state = ParseState::Footer2;
                None
            }
            ParseState::Footer2 => {
                let body_size = self.buffer.header().body_size as usize;
                self.buffer.set_byte(HEADER_SIZE + body_size + 1, byte);
                self.reset();
                Some(ParseOutcome::Complete)
            }
        }
    }

    /// Hands out the raw header history shifted by one byte, consuming it.
    ///
    /// Returns `Some` only when a full header's worth of bytes has been
    /// seen, which is always the case at a header-checksum failure. The
    /// history length resets so a re-fed attempt cannot chain a second
    /// backtrack off the same bytes.
    pub fn take_resync_window(&mut self) -> Option<[u8; HEADER_SIZE - 1]> {
        if self.history_len < HEADER_SIZE {
            return None;
        }
        let mut window = [0u8; HEADER_SIZE - 1];
        // With the ring full, the oldest byte sits at the write head.
        for (i, slot) in window.iter_mut().enumerate() {
            *slot = self.history[(self.history_head + 1 + i) % HEADER_SIZE];
        }
        self.history_len = 0;
        Some(window)
    }

    /// The non-terminal status to report when the stream runs dry:
    /// `PartialPacket` while hunting or mid-frame, `PartialHeaderValid`
    /// once the header validated, `BadSignature` right after a stray byte.
    pub fn interim(&self) -> ErrorKind {
        self.interim
    }

    /// The shared receive buffer holding the most recently parsed frame.
    pub fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    /// Header fields of the frame (or partial frame) in the receive buffer.
    pub fn header(&self) -> Header {
        self.buffer.header()
    }

    fn history_push(&mut self, byte: u8) {
        self.history[self.history_head] = byte;
        self.history_head = (self.history_head + 1) % HEADER_SIZE;
        if self.history_len < HEADER_SIZE {
            self.history_len += 1;
        }
    }

    fn reset(&mut self) {
        self.state = ParseState::Sig1;
        self.body_cursor = 0;
        if self.interim == ErrorKind::PartialHeaderValid {
            self.interim = ErrorKind::PartialPacket;
        }
    }
}

#[cfg(test)]
mod tests {
    use framelink_core::constants::FOOTER_SIZE;

    use super::*;
    use crate::packet::PacketType;

    fn wire_frame(src: u8, dest: u8, body: &[u8], trans_id: u8) -> Vec<u8> {
        let header = Header::data(src, dest, body.len() as u8, trans_id);
        let mut buffer = PacketBuffer::build(Vec::new(), header, &[body]);
        buffer.seal();
        buffer.as_wire_bytes().to_vec()
    }

    fn feed(parser: &mut Parser, bytes: &[u8]) -> Vec<ParseOutcome> {
        bytes.iter().filter_map(|&b| parser.push(b)).collect()
    }

    #[test]
    fn test_parses_frame_byte_at_a_time() {
        let mut parser = Parser::new(54);
        let wire = wire_frame(3, 5, b"payload", 42);

        let outcomes = feed(&mut parser, &wire);

        assert_eq!(outcomes, vec![ParseOutcome::Complete]);
        let header = parser.header();
        assert_eq!(header.src, 3);
        assert_eq!(header.dest, 5);
        assert_eq!(header.trans_id, 42);
        assert_eq!(header.packet_type().unwrap(), PacketType::Data);
        assert_eq!(parser.buffer().body(), b"payload");
        assert_eq!(parser.buffer().wire_crc(), parser.buffer().compute_crc());
    }

    #[test]
    fn test_zero_body_frame_completes() {
        let mut parser = Parser::new(54);
        let wire = wire_frame(0, 1, b"", 0);
        assert_eq!(wire.len(), HEADER_SIZE + FOOTER_SIZE);

        let outcomes = feed(&mut parser, &wire);

        assert_eq!(outcomes, vec![ParseOutcome::Complete]);
        assert_eq!(parser.buffer().body(), b"");
    }

    #[test]
    fn test_garbage_between_frames_is_absorbed() {
        let mut parser = Parser::new(54);
        let mut stream = wire_frame(0, 1, b"one", 1);
        stream.push(0x13);
        stream.extend(wire_frame(0, 1, b"two", 2));

        let outcomes = feed(&mut parser, &stream);

        assert_eq!(outcomes, vec![ParseOutcome::Complete, ParseOutcome::Complete]);
        assert_eq!(parser.buffer().body(), b"two");
    }

    #[test]
    fn test_stuttered_sync_resynchronizes() {
        let mut parser = Parser::new(54);
        let mut stream = vec![SYNC_1];
        stream.extend(wire_frame(2, 4, b"x", 7));

        let outcomes = feed(&mut parser, &stream);

        assert_eq!(outcomes, vec![ParseOutcome::Complete]);
        assert_eq!(parser.buffer().body(), b"x");
    }

    #[test]
    fn test_header_checksum_failure_reported_once() {
        let mut parser = Parser::new(54);
        let mut wire = wire_frame(0, 1, b"abc", 3);
        wire[OFF_TRANS_ID] ^= 0xFF;

        let outcomes = feed(&mut parser, &wire[..HEADER_SIZE]);

        assert_eq!(outcomes, vec![ParseOutcome::BadHeaderChecksum]);
        assert!(parser.take_resync_window().is_some());
        // Consumed: a second backtrack needs a fresh header's worth of bytes.
        assert!(parser.take_resync_window().is_none());
    }

    #[test]
    fn test_resync_window_skips_first_byte() {
        let mut parser = Parser::new(54);
        let bytes = [SYNC_1, SYNC_1, SYNC_2, 1, 0, 0, 3, 7];
        feed(&mut parser, &bytes);

        // Force the window out mid-frame to inspect its contents.
        let window = parser.take_resync_window().unwrap();
        assert_eq!(window, [SYNC_1, SYNC_2, 1, 0, 0, 3, 7]);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut parser = Parser::new(4);
        let wire = wire_frame(0, 1, b"toolarge", 9);

        let outcomes = feed(&mut parser, &wire[..HEADER_SIZE]);

        assert_eq!(outcomes, vec![ParseOutcome::PacketTooLarge { got: 8 }]);
        // Parser is hunting again.
        assert_eq!(parser.interim(), ErrorKind::PartialPacket);
    }

    #[test]
    fn test_interim_tracks_progress() {
        let mut parser = Parser::new(54);
        assert_eq!(parser.interim(), ErrorKind::PartialPacket);

        parser.push(0x55);
        assert_eq!(parser.interim(), ErrorKind::BadSignature);

        let wire = wire_frame(1, 2, b"zz", 5);
        feed(&mut parser, &wire[..HEADER_SIZE]);
        assert_eq!(parser.interim(), ErrorKind::PartialHeaderValid);

        feed(&mut parser, &wire[HEADER_SIZE..]);
        assert_eq!(parser.interim(), ErrorKind::PartialPacket);
    }

    #[test]
    fn test_corrupt_body_still_completes() {
        // CRC validation is the framer's call; the parser only assembles.
        let mut parser = Parser::new(54);
        let mut wire = wire_frame(0, 1, b"data", 1);
        let body_at = HEADER_SIZE + 1;
        wire[body_at] ^= 0x01;

        let outcomes = feed(&mut parser, &wire);

        assert_eq!(outcomes, vec![ParseOutcome::Complete]);
        assert_ne!(parser.buffer().wire_crc(), parser.buffer().compute_crc());
    }
}
