//! Framer: socket-to-port mapping, outbound sealing, and the receive poll.

use std::time::Duration;

use framelink_core::{Config, ErrorKind, PortDriver, PortId, Result};
use framelink_protocol::{Header, PacketBuffer, ParseOutcome, Parser};
use tracing::{error, trace};

/// Bytes requested from the driver per `recv` call. One byte keeps the
/// parser exact on byte streams; a DMA-style driver that hands over whole
/// frames could raise this to the full packet size.
const RECV_CHUNK: usize = 1;

/// What one receive poll produced.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A CRC-valid frame sits in the shared receive buffer.
    Frame {
        /// Header of the received frame.
        header: Header,
        /// CRC confirmed against the footer; used for duplicate tracking.
        crc: u16,
    },
    /// The round ended without a deliverable frame. `header` holds whatever
    /// fields parsed before the failure, which is enough to NAK a corrupt
    /// DATA frame.
    Error {
        /// Why no frame was delivered.
        kind: ErrorKind,
        /// Possibly partial header fields.
        header: Header,
    },
}

/// Serializes packets to the wire and reassembles them from it.
///
/// Owns the port driver, the socket-to-port table and the single receive
/// parser. Exactly one framer exists per node; the parser's receive buffer
/// is shared across all ports.
pub struct Framer<D: PortDriver> {
    driver: D,
    parser: Parser,
    /// Socket id to bound port; `None` when the socket is closed.
    bindings: Vec<Option<PortId>>,
    port_max: u8,
    max_body: usize,
}

impl<D: PortDriver> Framer<D> {
    /// Creates a framer over `driver` sized by `config`.
    pub fn new(driver: D, config: &Config) -> Self {
        Self {
            driver,
            parser: Parser::new(config.max_body()),
            bindings: vec![None; config.socket_max as usize],
            port_max: config.port_max,
            max_body: config.max_body(),
        }
    }

    /// Opens the underlying link for `port`.
    pub fn open_port(&mut self, port: PortId) -> Result<()> {
        if port >= self.port_max {
            return Err(ErrorKind::BadArgument("port id out of range"));
        }
        self.driver.open(port).map_err(|err| {
            error!(port, %err, "port open failed");
            ErrorKind::PortOpenFailed(port)
        })
    }

    /// Whether the link behind `port` is open.
    pub fn is_port_open(&self, port: PortId) -> bool {
        self.driver.is_open(port)
    }

    /// Binds `socket` to `port`. A socket may be bound to at most one port.
    pub fn open_socket(&mut self, port: PortId, socket: u8) -> Result<()> {
        if !self.is_port_open(port) {
            return Err(ErrorKind::PortNotOpen(port));
        }
        if socket as usize >= self.bindings.len() {
            return Err(ErrorKind::BadSocketId(socket));
        }
        if self.bindings[socket as usize].is_some() {
            return Err(ErrorKind::SocketAlreadyOpen(socket));
        }
        self.bindings[socket as usize] = Some(port);
        Ok(())
    }

    /// Unbinds `socket`. Closing a closed socket is not an error.
    pub fn close_socket(&mut self, socket: u8) -> Result<()> {
        if socket as usize >= self.bindings.len() {
            return Err(ErrorKind::BadSocketId(socket));
        }
        self.bindings[socket as usize] = None;
        Ok(())
    }

    /// Whether `socket` is currently bound to a port.
    pub fn is_socket_open(&self, socket: u8) -> bool {
        self.port_of(socket).is_some()
    }

    /// The port `socket` is bound to, if any.
    pub fn port_of(&self, socket: u8) -> Option<PortId> {
        self.bindings.get(socket as usize).copied().flatten()
    }

    /// Discards buffered inbound bytes on `port`.
    pub fn flush(&mut self, port: PortId) {
        self.driver.flush(port);
    }

    /// Seals `buffer` (sync bytes, header checksum, little-endian CRC) and
    /// transmits it whole on the port its source socket is bound to. Does
    /// not wait for any acknowledgement.
    pub fn send(&mut self, buffer: &mut PacketBuffer) -> Result<()> {
        let header = buffer.header();
        if header.src as usize >= self.bindings.len() {
            return Err(ErrorKind::BadSocketId(header.src));
        }
        let port = self.port_of(header.src).ok_or(ErrorKind::SocketNotOpen(header.src))?;
        if !self.driver.is_open(port) {
            return Err(ErrorKind::PortNotOpen(port));
        }
        buffer.seal();
        self.driver.send(port, buffer.as_wire_bytes()).map_err(|err| {
            error!(port, %err, "driver send failed");
            ErrorKind::SendFailure(port)
        })
    }

    /// Drives the parser with bytes from `port` until one frame completes
    /// (successfully or not) or the driver has nothing more buffered. At
    /// most one frame is returned per call; the shared receive buffer is
    /// valid until the next poll.
    pub fn poll_receive(&mut self, port: PortId, timeout: Duration) -> Result<ReceiveOutcome> {
        if !self.driver.is_open(port) {
            return Err(ErrorKind::PortNotOpen(port));
        }

        loop {
            let mut chunk = [0u8; RECV_CHUNK];
            let n = self.driver.recv(port, &mut chunk, timeout)?;
            if n == 0 {
                // Stream dry; report where the parser stands.
                return Ok(ReceiveOutcome::Error {
                    kind: self.parser.interim(),
                    header: self.parser.header(),
                });
            }

            let mut completed = None;
            for &byte in &chunk[..n] {
                if let Some(outcome) = self.parser.push(byte) {
                    completed = Some(outcome);
                }
            }

            if completed == Some(ParseOutcome::BadHeaderChecksum) {
                // The header may be misaligned on a stray 0xBE. Re-run its
                // bytes shifted by one; runs at most once per failed header.
                if let Some(window) = self.parser.take_resync_window() {
                    trace!(port, "header checksum failed, re-examining sync window");
                    completed = None;
                    for &byte in &window {
                        if let Some(outcome) = self.parser.push(byte) {
                            completed = Some(outcome);
                        }
                    }
                }
            }

            if let Some(outcome) = completed {
                return Ok(self.classify(outcome));
            }
        }
    }

    /// Body slice of the most recently received frame. Borrowed from the
    /// shared receive buffer; invalidated by the next poll.
    pub fn recv_payload(&self) -> &[u8] {
        self.parser.buffer().body()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the underlying driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Maps a terminal parse outcome to a receive outcome, applying the
    /// completion checks in their wire order: destination range, binding,
    /// then the CRC compare.
    fn classify(&self, outcome: ParseOutcome) -> ReceiveOutcome {
        let header = self.parser.header();
        match outcome {
            ParseOutcome::Complete => {
                if header.dest as usize >= self.bindings.len() {
                    ReceiveOutcome::Error { kind: ErrorKind::BadSocketId(header.dest), header }
                } else if self.bindings[header.dest as usize].is_none() {
                    ReceiveOutcome::Error { kind: ErrorKind::SocketNotOpen(header.dest), header }
                } else {
                    let crc = self.parser.buffer().compute_crc();
                    if crc == self.parser.buffer().wire_crc() {
                        ReceiveOutcome::Frame { header, crc }
                    } else {
                        ReceiveOutcome::Error { kind: ErrorKind::CorruptedPacket, header }
                    }
                }
            }
            ParseOutcome::BadHeaderChecksum => {
                ReceiveOutcome::Error { kind: ErrorKind::BadHeaderChecksum, header }
            }
            ParseOutcome::PacketTooLarge { got } => ReceiveOutcome::Error {
                kind: ErrorKind::PacketTooLarge { got, max: self.max_body },
                header,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use framelink_protocol::PacketType;

    use super::*;

    /// Two ports backed by plain byte queues; no cross-wiring.
    struct QueueLink {
        rx: Vec<VecDeque<u8>>,
        sent: Vec<Vec<u8>>,
        open: Vec<bool>,
    }

    impl QueueLink {
        fn new(ports: usize) -> Self {
            Self { rx: vec![VecDeque::new(); ports], sent: Vec::new(), open: vec![false; ports] }
        }

        fn inject(&mut self, port: PortId, bytes: &[u8]) {
            self.rx[port as usize].extend(bytes);
        }
    }

    impl PortDriver for QueueLink {
        fn open(&mut self, port: PortId) -> Result<()> {
            self.open[port as usize] = true;
            Ok(())
        }
        fn is_open(&self, port: PortId) -> bool {
            self.open[port as usize]
        }
        fn send(&mut self, _port: PortId, buf: &[u8]) -> Result<()> {
            self.sent.push(buf.to_vec());
            Ok(())
        }
        fn recv(&mut self, port: PortId, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let rx = &mut self.rx[port as usize];
            let mut n = 0;
            while n < buf.len() {
                match rx.pop_front() {
                    Some(byte) => {
                        buf[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
        fn flush(&mut self, port: PortId) {
            self.rx[port as usize].clear();
        }
        fn is_recv_queue_empty(&self, port: PortId) -> bool {
            self.rx[port as usize].is_empty()
        }
        fn power_save(&mut self, _enabled: bool) {}
    }

    fn framer_with_sockets() -> Framer<QueueLink> {
        let config = Config::default();
        let mut framer = Framer::new(QueueLink::new(2), &config);
        framer.open_port(0).unwrap();
        framer.open_port(1).unwrap();
        framer.open_socket(0, 0).unwrap();
        framer.open_socket(1, 1).unwrap();
        framer
    }

    fn sealed_frame(src: u8, dest: u8, body: &[u8], trans_id: u8) -> Vec<u8> {
        let header = Header::data(src, dest, body.len() as u8, trans_id);
        let mut buffer = PacketBuffer::build(Vec::new(), header, &[body]);
        buffer.seal();
        buffer.as_wire_bytes().to_vec()
    }

    #[test]
    fn test_socket_lifecycle() {
        let config = Config::default();
        let mut framer = Framer::new(QueueLink::new(2), &config);

        // Binding requires an open port.
        assert_eq!(framer.open_socket(0, 3), Err(ErrorKind::PortNotOpen(0)));

        framer.open_port(0).unwrap();
        framer.open_socket(0, 3).unwrap();
        assert!(framer.is_socket_open(3));
        assert_eq!(framer.port_of(3), Some(0));

        // Rebinding a bound socket is rejected, not overwritten.
        assert_eq!(framer.open_socket(0, 3), Err(ErrorKind::SocketAlreadyOpen(3)));

        framer.close_socket(3).unwrap();
        assert!(!framer.is_socket_open(3));
        // Closing again is idempotent.
        framer.close_socket(3).unwrap();

        assert_eq!(framer.open_socket(0, 200), Err(ErrorKind::BadSocketId(200)));
    }

    #[test]
    fn test_send_seals_and_transmits_whole_frame() {
        let mut framer = framer_with_sockets();
        let header = Header::data(0, 1, 2, 9);
        let mut buffer = PacketBuffer::build(Vec::new(), header, &[b"hi"]);

        framer.send(&mut buffer).unwrap();

        let sent = &framer.driver().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], buffer.as_wire_bytes());
        assert_eq!(sent[0].len(), 12);
    }

    #[test]
    fn test_send_requires_bound_source() {
        let mut framer = framer_with_sockets();
        let mut buffer = PacketBuffer::build(Vec::new(), Header::data(5, 1, 0, 0), &[]);
        assert_eq!(framer.send(&mut buffer), Err(ErrorKind::SocketNotOpen(5)));
    }

    #[test]
    fn test_poll_returns_one_frame_per_call() {
        let mut framer = framer_with_sockets();
        let mut stream = sealed_frame(0, 1, b"first", 1);
        stream.extend(sealed_frame(0, 1, b"second", 2));
        framer.driver_mut().inject(1, &stream);

        let timeout = Duration::from_millis(10);
        match framer.poll_receive(1, timeout).unwrap() {
            ReceiveOutcome::Frame { header, .. } => assert_eq!(header.trans_id, 1),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(framer.recv_payload(), b"first");

        match framer.poll_receive(1, timeout).unwrap() {
            ReceiveOutcome::Frame { header, .. } => assert_eq!(header.trans_id, 2),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(framer.recv_payload(), b"second");
    }

    #[test]
    fn test_poll_reports_partial_when_stream_dries_mid_frame() {
        let mut framer = framer_with_sockets();
        let frame = sealed_frame(0, 1, b"payload", 1);
        framer.driver_mut().inject(1, &frame[..5]);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Error { kind: ErrorKind::PartialPacket, .. } => {}
            other => panic!("expected partial, got {:?}", other),
        }

        // Header completes on the next poll once the rest arrives.
        framer.driver_mut().inject(1, &frame[5..]);
        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Frame { header, .. } => assert_eq!(header.dest, 1),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_poll_reports_partial_header_valid_mid_body() {
        let mut framer = framer_with_sockets();
        let frame = sealed_frame(0, 1, b"payload", 1);
        framer.driver_mut().inject(1, &frame[..10]);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Error { kind: ErrorKind::PartialHeaderValid, header } => {
                assert_eq!(header.packet_type().unwrap(), PacketType::Data);
            }
            other => panic!("expected valid partial header, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_body_classified_after_binding_checks() {
        let mut framer = framer_with_sockets();
        let mut frame = sealed_frame(0, 1, b"body", 1);
        frame[9] ^= 0x40;
        framer.driver_mut().inject(1, &frame);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Error { kind: ErrorKind::CorruptedPacket, header } => {
                assert_eq!(header.trans_id, 1);
            }
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_destination_is_not_dispatched() {
        let mut framer = framer_with_sockets();
        let frame = sealed_frame(0, 5, b"x", 1);
        framer.driver_mut().inject(1, &frame);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Error { kind: ErrorKind::SocketNotOpen(5), .. } => {}
            other => panic!("expected unbound socket, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_destination_flagged() {
        let mut framer = framer_with_sockets();
        let frame = sealed_frame(0, 250, b"x", 1);
        framer.driver_mut().inject(1, &frame);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Error { kind: ErrorKind::BadSocketId(250), .. } => {}
            other => panic!("expected bad socket id, got {:?}", other),
        }
    }

    #[test]
    fn test_misaligned_signature_recovered_by_backtrack() {
        let mut framer = framer_with_sockets();
        // A stray sync pair immediately before a real frame: the parser
        // commits to the stray pair as a frame start, fails the header
        // checksum two bytes early, then recovers the true frame from its
        // history window. (A lone stray 0xBE is absorbed by the stutter
        // rule and never needs the backtrack.)
        let mut stream = vec![0xBE, 0xEF];
        stream.extend(sealed_frame(0, 1, b"ok", 3));
        framer.driver_mut().inject(1, &stream);

        match framer.poll_receive(1, Duration::from_millis(10)).unwrap() {
            ReceiveOutcome::Frame { header, .. } => assert_eq!(header.trans_id, 3),
            other => panic!("expected recovered frame, got {:?}", other),
        }
        assert_eq!(framer.recv_payload(), b"ok");
    }
}
