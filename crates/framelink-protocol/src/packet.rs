//! Packet types and structures.
//!
//! One frame on the wire is an 8-byte header, an opaque body of up to the
//! configured budget, and a 2-byte little-endian CRC footer:
//!
//! ```text
//! | sig 0xBE | sig 0xEF | dest | src | type | bodySize | transId | checksum | body.. | crc lo | crc hi |
//! ```
//!
//! The checksum octet is the additive sum of the seven header bytes before
//! it; the CRC covers header and body.

use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};
use framelink_core::{
    constants::{FOOTER_SIZE, HEADER_SIZE, SYNC_1, SYNC_2},
    ErrorKind, Result,
};

use crate::checksum::{crc16, header_sum};

/// Per-sender message sequence number; wraps at 256.
pub type TransactionId = u8;

// Header byte offsets.
pub(crate) const OFF_DEST: usize = 2;
pub(crate) const OFF_SRC: usize = 3;
pub(crate) const OFF_KIND: usize = 4;
pub(crate) const OFF_BODY_SIZE: usize = 5;
pub(crate) const OFF_TRANS_ID: usize = 6;
pub(crate) const OFF_CHECKSUM: usize = 7;

/// Id to identify a certain packet type.
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Eq)]
pub enum PacketType {
    /// Carries an application payload and expects an ACK or NAK back.
    Data = 0,
    /// Zero-body acknowledgement of a DATA packet.
    Ack = 1,
    /// Zero-body negative acknowledgement; asks the sender to retransmit.
    Nak = 2,
}

impl TryFrom<u8> for PacketType {
    type Error = ErrorKind;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::Nak),
            _ => Err(ErrorKind::ParseError),
        }
    }
}

/// The meaningful header fields of one frame.
///
/// The two sync bytes and the checksum octet are derived on seal and are not
/// carried here. `kind` stays a raw octet because the parser must hold
/// whatever arrived; [`Header::packet_type`] narrows it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Destination socket id.
    pub dest: u8,
    /// Source socket id.
    pub src: u8,
    /// Raw packet type octet.
    pub kind: u8,
    /// Body length in bytes.
    pub body_size: u8,
    /// Transaction id stamped by the sender.
    pub trans_id: TransactionId,
}

impl Header {
    /// Builds a DATA header.
    pub fn data(src: u8, dest: u8, body_size: u8, trans_id: TransactionId) -> Self {
        Self { dest, src, kind: PacketType::Data as u8, body_size, trans_id }
    }

    /// Builds the zero-body control header answering `incoming`: source and
    /// destination swap roles, the transaction id is echoed.
    pub fn reply_to(incoming: &Header, kind: PacketType) -> Self {
        Self {
            dest: incoming.src,
            src: incoming.dest,
            kind: kind as u8,
            body_size: 0,
            trans_id: incoming.trans_id,
        }
    }

    /// Narrows the raw type octet.
    pub fn packet_type(&self) -> Result<PacketType> {
        PacketType::try_from(self.kind)
    }
}

/// Owns the bytes of exactly one framed packet (header, body, CRC).
///
/// A buffer is either sized exactly for an outgoing message or allocated at
/// the configured maximum for the shared receive slot, in which case the
/// header's body-size field decides how much of it is live.
#[derive(Debug)]
pub struct PacketBuffer {
    bytes: Vec<u8>,
}

impl PacketBuffer {
    /// Builds an outgoing packet from `header` and the gathered `chunks`,
    /// reusing `storage` as backing memory. The caller has already sized
    /// `header.body_size` to the chunk total.
    pub fn build(mut storage: Vec<u8>, header: Header, chunks: &[&[u8]]) -> Self {
        storage.clear();
        storage.resize(HEADER_SIZE + header.body_size as usize + FOOTER_SIZE, 0);
        let mut buffer = Self { bytes: storage };
        buffer.set_header(header);
        let mut at = HEADER_SIZE;
        for chunk in chunks {
            buffer.bytes[at..at + chunk.len()].copy_from_slice(chunk);
            at += chunk.len();
        }
        debug_assert_eq!(at, HEADER_SIZE + header.body_size as usize);
        buffer
    }

    /// Allocates a buffer able to hold any frame with a body up to
    /// `max_body` bytes. Used for the shared receive slot and the control
    /// scratch.
    pub fn with_max_body(max_body: usize) -> Self {
        Self { bytes: vec![0; HEADER_SIZE + max_body + FOOTER_SIZE] }
    }

    /// Rewrites the meaningful header fields. Sync and checksum octets are
    /// left for [`PacketBuffer::seal`].
    pub fn set_header(&mut self, header: Header) {
        self.bytes[OFF_DEST] = header.dest;
        self.bytes[OFF_SRC] = header.src;
        self.bytes[OFF_KIND] = header.kind;
        self.bytes[OFF_BODY_SIZE] = header.body_size;
        self.bytes[OFF_TRANS_ID] = header.trans_id;
    }

    /// Reads the header fields back out of the buffer.
    pub fn header(&self) -> Header {
        Header {
            dest: self.bytes[OFF_DEST],
            src: self.bytes[OFF_SRC],
            kind: self.bytes[OFF_KIND],
            body_size: self.bytes[OFF_BODY_SIZE],
            trans_id: self.bytes[OFF_TRANS_ID],
        }
    }

    /// Total live frame size: header, body, footer.
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.bytes[OFF_BODY_SIZE] as usize + FOOTER_SIZE
    }

    /// The live body slice.
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..HEADER_SIZE + self.bytes[OFF_BODY_SIZE] as usize]
    }

    /// The CRC carried in the footer, read little-endian.
    pub fn wire_crc(&self) -> u16 {
        let at = HEADER_SIZE + self.bytes[OFF_BODY_SIZE] as usize;
        LittleEndian::read_u16(&self.bytes[at..at + FOOTER_SIZE])
    }

    /// Recomputes the CRC over the live header and body.
    pub fn compute_crc(&self) -> u16 {
        crc16(&self.bytes[..HEADER_SIZE + self.bytes[OFF_BODY_SIZE] as usize])
    }

    /// Stamps sync bytes and header checksum, then computes the frame CRC
    /// and writes it little-endian into the footer. After sealing,
    /// [`PacketBuffer::as_wire_bytes`] is ready for the driver.
    pub fn seal(&mut self) {
        self.bytes[0] = SYNC_1;
        self.bytes[1] = SYNC_2;
        self.bytes[OFF_CHECKSUM] = header_sum(&self.bytes[..OFF_CHECKSUM]);
        let crc = self.compute_crc();
        let at = HEADER_SIZE + self.bytes[OFF_BODY_SIZE] as usize;
        LittleEndian::write_u16(&mut self.bytes[at..at + FOOTER_SIZE], crc);
    }

    /// The live on-wire bytes of this frame.
    pub fn as_wire_bytes(&self) -> &[u8] {
        &self.bytes[..self.packet_size()]
    }

    /// Gives the backing memory back, typically to a pool.
    pub fn into_storage(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn set_byte(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    /// The raw header octets. Safe to read even while the body-size field
    /// still holds an unvalidated value.
    pub(crate) fn header_bytes(&self) -> &[u8] {
        &self.bytes[..HEADER_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_narrowing() {
        assert_eq!(PacketType::try_from(0).unwrap(), PacketType::Data);
        assert_eq!(PacketType::try_from(1).unwrap(), PacketType::Ack);
        assert_eq!(PacketType::try_from(2).unwrap(), PacketType::Nak);
        assert!(PacketType::try_from(3).is_err());
    }

    #[test]
    fn test_reply_swaps_endpoints_and_echoes_trans_id() {
        let data = Header::data(4, 9, 17, 0xAB);
        let ack = Header::reply_to(&data, PacketType::Ack);

        assert_eq!(ack.src, 9);
        assert_eq!(ack.dest, 4);
        assert_eq!(ack.trans_id, 0xAB);
        assert_eq!(ack.body_size, 0);
        assert_eq!(ack.packet_type().unwrap(), PacketType::Ack);
    }

    #[test]
    fn test_build_gathers_chunks() {
        let header = Header::data(0, 1, 5, 7);
        let buffer = PacketBuffer::build(Vec::new(), header, &[b"he", b"llo"]);

        assert_eq!(buffer.body(), b"hello");
        assert_eq!(buffer.header(), header);
        assert_eq!(buffer.packet_size(), HEADER_SIZE + 5 + FOOTER_SIZE);
    }

    #[test]
    fn test_seal_writes_sync_checksum_and_crc() {
        let header = Header::data(2, 3, 3, 1);
        let mut buffer = PacketBuffer::build(Vec::new(), header, &[b"abc"]);
        buffer.seal();

        let wire = buffer.as_wire_bytes();
        assert_eq!(wire[0], SYNC_1);
        assert_eq!(wire[1], SYNC_2);
        assert_eq!(wire[OFF_CHECKSUM], header_sum(&wire[..OFF_CHECKSUM]));
        assert_eq!(buffer.wire_crc(), buffer.compute_crc());
    }

    #[test]
    fn test_zero_body_frame() {
        let header = Header::reply_to(&Header::data(1, 2, 0, 9), PacketType::Nak);
        let mut buffer = PacketBuffer::build(Vec::new(), header, &[]);
        buffer.seal();

        assert_eq!(buffer.body(), b"");
        assert_eq!(buffer.packet_size(), HEADER_SIZE + FOOTER_SIZE);
        assert_eq!(buffer.wire_crc(), buffer.compute_crc());
    }
}
