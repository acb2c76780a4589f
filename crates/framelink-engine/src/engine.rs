//! Protocol engine: send queues, retries, ACK/NAK synthesis, duplicate
//! suppression and listener dispatch.
//!
//! All state lives behind `&mut self`; one thread drives [`Engine::tick`]
//! and the application-facing calls. Other threads hand messages in through
//! the cloned [`MessageSender`], which the tick drains before walking the
//! ports. Each tick runs one receive step and one send step per open port,
//! so no port can starve another.

use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace};

use framelink_core::{BufferPool, Config, ErrorKind, PortDriver, PortId, Result};
use framelink_protocol::{Header, PacketBuffer, PacketType, TransactionId};

use crate::{
    events::{Listener, ListenerTable, SocketEvent},
    framer::{Framer, ReceiveOutcome},
    queue::{SendEntry, SendQueue, SendState},
};

/// One message handed to the engine from another thread.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Source socket id.
    pub src: u8,
    /// Destination socket id.
    pub dst: u8,
    /// Payload, at most the configured body budget.
    pub payload: Vec<u8>,
}

/// Cloneable handle for enqueueing messages from outside the tick thread.
/// Capacity and argument errors surface through the error handler when the
/// tick drains the channel, not at the call site.
pub type MessageSender = Sender<OutboundMessage>;

/// The protocol engine binding the framer to per-port send queues.
pub struct Engine<D: PortDriver> {
    config: Config,
    framer: Framer<D>,
    /// One send queue per port, indexed by port id.
    queues: Vec<SendQueue>,
    listeners: ListenerTable,
    /// `(transId, crc)` of the last DATA packet dispatched per port.
    last_received: Vec<Option<(TransactionId, u16)>>,
    /// Process-wide transaction counter; wraps at 256.
    next_trans_id: TransactionId,
    /// Recycles packet storage for send entries.
    pool: BufferPool,
    /// Backing memory reused for every outgoing ACK/NAK.
    control_storage: Vec<u8>,
    error_handler: Option<Box<dyn FnMut(ErrorKind) + Send>>,
    last_error: Option<ErrorKind>,
    outbound_tx: Sender<OutboundMessage>,
    outbound_rx: Receiver<OutboundMessage>,
}

impl<D: PortDriver> Engine<D> {
    /// Creates an engine over `driver` with the given configuration.
    pub fn new(driver: D, config: Config) -> Self {
        let ports = config.port_max as usize;
        let pool_size = config.max_messages * ports + 1;
        let (outbound_tx, outbound_rx) = unbounded();
        Self {
            framer: Framer::new(driver, &config),
            queues: (0..ports).map(|_| SendQueue::new()).collect(),
            listeners: ListenerTable::new(config.socket_max),
            last_received: vec![None; ports],
            next_trans_id: 0,
            pool: BufferPool::new(config.max_packet_size, pool_size),
            control_storage: Vec::new(),
            error_handler: None,
            last_error: None,
            outbound_tx,
            outbound_rx,
            config,
        }
    }

    /// Opens the link behind `port`.
    pub fn open_port(&mut self, port: PortId) -> Result<()> {
        self.framer.open_port(port).map_err(|err| self.report(err))
    }

    /// Whether `port` is open.
    pub fn is_port_open(&self, port: PortId) -> bool {
        self.framer.is_port_open(port)
    }

    /// Binds `socket` to `port`.
    pub fn open_socket(&mut self, port: PortId, socket: u8) -> Result<()> {
        self.framer.open_socket(port, socket).map_err(|err| self.report(err))
    }

    /// Unbinds `socket`; idempotent once closed.
    pub fn close_socket(&mut self, socket: u8) -> Result<()> {
        self.framer.close_socket(socket).map_err(|err| self.report(err))
    }

    /// Whether `socket` is bound to a port.
    pub fn is_socket_open(&self, socket: u8) -> bool {
        self.framer.is_socket_open(socket)
    }

    /// The port `socket` is bound to, if any.
    pub fn port_of(&self, socket: u8) -> Option<PortId> {
        self.framer.port_of(socket)
    }

    /// Installs the listener called for traffic and send completions on
    /// `socket`. At most one listener per socket.
    pub fn listen(&mut self, socket: u8, listener: Listener) -> Result<()> {
        if socket >= self.config.socket_max {
            return Err(self.report(ErrorKind::BadSocketId(socket)));
        }
        if !self.framer.is_socket_open(socket) {
            return Err(self.report(ErrorKind::SocketNotOpen(socket)));
        }
        self.listeners.register(socket, listener).map_err(|err| self.report(err))
    }

    /// Queues `payload` for delivery from `src` to `dst`. Completion is
    /// reported to the listener on `src`; the call itself never waits.
    pub fn send(&mut self, src: u8, dst: u8, payload: &[u8]) -> Result<()> {
        self.send_slices(src, dst, &[payload])
    }

    /// Gather form of [`Engine::send`]: copies the slices back to back into
    /// one frame body.
    pub fn send_slices(&mut self, src: u8, dst: u8, slices: &[&[u8]]) -> Result<()> {
        if slices.is_empty() {
            return Err(self.report(ErrorKind::BadArgument("at least one payload slice")));
        }
        let total: usize = slices.iter().map(|s| s.len()).sum();
        if total > self.config.max_body() {
            return Err(self
                .report(ErrorKind::DataSizeTooLarge { got: total, max: self.config.max_body() }));
        }
        let port = match self.framer.port_of(src) {
            Some(port) => port,
            None => return Err(self.report(ErrorKind::BadSocketId(src))),
        };
        if self.queues[port as usize].len() >= self.config.max_messages {
            return Err(self.report(ErrorKind::QueueFull(port)));
        }

        let header = Header::data(src, dst, total as u8, self.next_trans_id);
        self.next_trans_id = self.next_trans_id.wrapping_add(1);

        let storage = self.pool.allocate();
        let buffer = PacketBuffer::build(storage, header, slices);
        self.queues[port as usize].push_back(SendEntry::new(buffer));

        // Outgoing traffic pending: wake the link up.
        self.framer.driver_mut().power_save(false);
        Ok(())
    }

    /// A handle other threads can use to enqueue messages; drained at the
    /// start of every tick.
    pub fn message_sender(&self) -> MessageSender {
        self.outbound_tx.clone()
    }

    /// Number of messages queued on `port`.
    pub fn send_queue_len(&self, port: PortId) -> usize {
        self.queues.get(port as usize).map_or(0, SendQueue::len)
    }

    /// Whether the driver reports nothing readable on `port`.
    pub fn recv_queue_empty(&self, port: PortId) -> bool {
        self.framer.driver().is_recv_queue_empty(port)
    }

    /// Discards buffered inbound bytes on `port`.
    pub fn flush(&mut self, port: PortId) {
        self.framer.flush(port);
    }

    /// Installs the handler invoked on every surfaced error.
    pub fn set_error_handler(&mut self, handler: Box<dyn FnMut(ErrorKind) + Send>) {
        self.error_handler = Some(handler);
    }

    /// The most recent surfaced error.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Drops all queued messages on every port. Abandoned messages get no
    /// completion callbacks.
    pub fn term(&mut self) {
        for queue in &mut self.queues {
            for entry in queue.clear() {
                self.pool.release(entry.buffer.into_storage());
            }
        }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        self.framer.driver()
    }

    /// Mutable access to the underlying driver.
    pub fn driver_mut(&mut self) -> &mut D {
        self.framer.driver_mut()
    }

    /// Runs one processing round: drains cross-thread sends, then for every
    /// open port performs one receive step and one send step, and finally
    /// passes the power-save hint to the driver.
    pub fn tick(&mut self, now: Instant) {
        self.drain_outbound();

        let mut all_idle = true;
        for port in 0..self.config.port_max {
            if self.framer.is_port_open(port) {
                self.process_receive(port, now);
                self.process_send(port, now);
                if !self.queues[port as usize].is_empty() {
                    all_idle = false;
                }
            }
        }

        self.framer.driver_mut().power_save(all_idle);
    }

    fn drain_outbound(&mut self) {
        while let Ok(message) = self.outbound_rx.try_recv() {
            // Failures are already routed through the error handler.
            let _ = self.send(message.src, message.dst, &message.payload);
        }
    }

    /// Receive step: pull at most one frame off the port and react to it,
    /// then sweep ACK timeouts across the whole queue.
    fn process_receive(&mut self, port: PortId, now: Instant) {
        if !self.framer.driver().is_recv_queue_empty(port) {
            match self.framer.poll_receive(port, self.config.recv_timeout) {
                Ok(ReceiveOutcome::Frame { header, crc }) => self.handle_frame(port, header, crc),
                Ok(ReceiveOutcome::Error { kind, header }) => {
                    // A corrupt or stalled frame whose header still reads as
                    // DATA gets a NAK so the sender retransmits.
                    if matches!(kind, ErrorKind::CorruptedPacket | ErrorKind::PartialHeaderValid)
                        && header.packet_type() == Ok(PacketType::Data)
                    {
                        self.send_control(PacketType::Nak, &header);
                        debug!(port, %kind, "corrupt data received, NAK sent");
                    } else {
                        trace!(port, %kind, "receive round without frame");
                    }
                }
                Err(err) => {
                    self.report(err);
                }
            }
        }

        let expired = self.queues[port as usize].expire_awaiting(now, self.config.ack_timeout);
        if expired > 0 {
            debug!(port, expired, "ack timeout, message(s) queued for resend");
        }
    }

    /// Send step: the queue head either transmits, keeps waiting for its
    /// ACK, or fails out once its attempts are spent.
    fn process_send(&mut self, port: PortId, now: Instant) {
        let max_retries = self.config.max_retries;
        let exhausted = matches!(
            self.queues[port as usize].front(),
            Some(entry) if entry.state == SendState::Send && entry.retries >= max_retries
        );
        if exhausted {
            if let Some(entry) = self.queues[port as usize].pop_front() {
                let header = entry.buffer.header();
                debug!(
                    port,
                    socket = header.src,
                    trans_id = header.trans_id,
                    "send retries exhausted"
                );
                self.pool.release(entry.buffer.into_storage());
                self.notify_send_complete(header.src, Err(ErrorKind::SendRetriesFailed));
            }
            return;
        }

        let entry = match self.queues[port as usize].front_mut() {
            Some(entry) if entry.state == SendState::Send => entry,
            _ => return,
        };

        entry.retries += 1;
        match self.framer.send(&mut entry.buffer) {
            Ok(()) => {
                entry.last_send = Some(now);
                entry.state = SendState::AwaitAck;
            }
            Err(err) => {
                // The attempt is spent; the entry stays at the head and the
                // next tick retries or fails it out.
                let header = entry.buffer.header();
                debug!(port, socket = header.src, trans_id = header.trans_id, %err, "send failed");
            }
        }
    }

    /// Reacts to one CRC-valid frame from `port`.
    fn handle_frame(&mut self, port: PortId, header: Header, crc: u16) {
        match header.packet_type() {
            Ok(PacketType::Ack) => {
                trace!(port, socket = header.dest, trans_id = header.trans_id, "ACK received");
                if let Some(entry) = self.queues[port as usize].remove_answered(&header) {
                    let src = entry.buffer.header().src;
                    self.pool.release(entry.buffer.into_storage());
                    self.notify_send_complete(src, Ok(()));
                }
            }
            Ok(PacketType::Nak) => {
                trace!(port, socket = header.dest, trans_id = header.trans_id, "NAK received");
                if let Some(entry) = self.queues[port as usize].answered_mut(&header) {
                    entry.state = SendState::Send;
                }
            }
            Ok(PacketType::Data) => {
                trace!(port, socket = header.dest, trans_id = header.trans_id, "data received");
                if self.listeners.is_registered(header.dest) {
                    // ACK first; duplicates are acknowledged again but
                    // dispatched only once.
                    self.send_control(PacketType::Ack, &header);
                    if self.last_received[port as usize] == Some((header.trans_id, crc)) {
                        trace!(port, trans_id = header.trans_id, "duplicate data dropped");
                    } else {
                        self.last_received[port as usize] = Some((header.trans_id, crc));
                        let payload = self.framer.recv_payload();
                        if let Some(listener) = self.listeners.get_mut(header.dest) {
                            listener(header.dest, SocketEvent::Received { payload });
                        }
                    }
                } else {
                    // Nobody to hand the payload to; ask the sender to back
                    // off and retry.
                    self.send_control(PacketType::Nak, &header);
                }
            }
            Err(_) => {
                debug!(port, kind = header.kind, "unknown packet type received");
            }
        }
    }

    /// Sends a zero-body ACK/NAK answering `incoming`, reusing the control
    /// scratch storage.
    fn send_control(&mut self, kind: PacketType, incoming: &Header) {
        let header = Header::reply_to(incoming, kind);
        let storage = std::mem::take(&mut self.control_storage);
        let mut buffer = PacketBuffer::build(storage, header, &[]);
        if let Err(err) = self.framer.send(&mut buffer) {
            debug!(%err, "control packet send failed");
        }
        self.control_storage = buffer.into_storage();
    }

    fn notify_send_complete(&mut self, socket: u8, result: Result<()>) {
        if let Some(listener) = self.listeners.get_mut(socket) {
            listener(socket, SocketEvent::SendComplete { result });
        }
    }

    /// Records `err` as the last error and hands it to the registered
    /// handler before it is returned to the caller.
    fn report(&mut self, err: ErrorKind) -> ErrorKind {
        self.last_error = Some(err);
        if let Some(handler) = self.error_handler.as_mut() {
            handler(err);
        }
        err
    }
}
