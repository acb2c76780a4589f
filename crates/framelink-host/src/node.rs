//! High-level node: engine + driver + clock.

use std::sync::Arc;

use framelink_core::{Config, ErrorKind, PortDriver, PortId, Result};
use framelink_engine::{Engine, Listener, MessageSender};

use crate::{
    loopback::LoopbackLink,
    time::{Clock, SystemClock},
    udp::{UdpBinding, UdpLink},
};

/// One protocol endpoint: the engine bound to a concrete driver, with a
/// clock supplying the instants fed into each tick.
pub struct Node<D: PortDriver> {
    engine: Engine<D>,
    clock: Arc<dyn Clock>,
}

impl Node<LoopbackLink> {
    /// Node whose ports are loopback pairs in this process, with default
    /// configuration.
    pub fn loopback() -> Self {
        Self::loopback_with_config(Config::default())
    }

    /// Loopback node with custom configuration.
    pub fn loopback_with_config(config: Config) -> Self {
        let driver = LoopbackLink::new(config.port_max);
        Self::with_driver(driver, config)
    }
}

impl Node<UdpLink> {
    /// Node whose ports are UDP sockets, one per binding.
    pub fn udp(bindings: &[UdpBinding], config: Config) -> Result<Self> {
        let driver = UdpLink::bind(bindings, &config)?;
        Ok(Self::with_driver(driver, config))
    }
}

impl<D: PortDriver> Node<D> {
    /// Wraps `driver` with the system clock.
    pub fn with_driver(driver: D, config: Config) -> Self {
        Self::with_driver_and_clock(driver, config, Arc::new(SystemClock))
    }

    /// Wraps `driver` with a caller-supplied clock, e.g. a manual clock in
    /// tests.
    pub fn with_driver_and_clock(driver: D, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self { engine: Engine::new(driver, config), clock }
    }

    /// Runs one engine tick at the clock's current instant. Call this
    /// periodically from one thread; listeners fire from inside it.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.engine.tick(now);
    }

    /// Opens the link behind `port`.
    pub fn open_port(&mut self, port: PortId) -> Result<()> {
        self.engine.open_port(port)
    }

    /// Binds `socket` to `port`.
    pub fn open_socket(&mut self, port: PortId, socket: u8) -> Result<()> {
        self.engine.open_socket(port, socket)
    }

    /// Unbinds `socket`.
    pub fn close_socket(&mut self, socket: u8) -> Result<()> {
        self.engine.close_socket(socket)
    }

    /// Whether `port` is open.
    pub fn is_port_open(&self, port: PortId) -> bool {
        self.engine.is_port_open(port)
    }

    /// Whether `socket` is bound to a port.
    pub fn is_socket_open(&self, socket: u8) -> bool {
        self.engine.is_socket_open(socket)
    }

    /// The port `socket` is bound to, if any.
    pub fn port_of(&self, socket: u8) -> Option<PortId> {
        self.engine.port_of(socket)
    }

    /// Installs the listener for `socket`.
    pub fn listen(&mut self, socket: u8, listener: Listener) -> Result<()> {
        self.engine.listen(socket, listener)
    }

    /// Queues one payload for delivery from `src` to `dst`.
    pub fn send(&mut self, src: u8, dst: u8, payload: &[u8]) -> Result<()> {
        self.engine.send(src, dst, payload)
    }

    /// Gather form of [`Node::send`].
    pub fn send_slices(&mut self, src: u8, dst: u8, slices: &[&[u8]]) -> Result<()> {
        self.engine.send_slices(src, dst, slices)
    }

    /// Handle for enqueueing sends from other threads.
    pub fn message_sender(&self) -> MessageSender {
        self.engine.message_sender()
    }

    /// Messages queued on `port`.
    pub fn send_queue_len(&self, port: PortId) -> usize {
        self.engine.send_queue_len(port)
    }

    /// Whether nothing is waiting to be read on `port`.
    pub fn recv_queue_empty(&self, port: PortId) -> bool {
        self.engine.recv_queue_empty(port)
    }

    /// Discards buffered inbound bytes on `port`.
    pub fn flush(&mut self, port: PortId) {
        self.engine.flush(port);
    }

    /// Installs the handler invoked on every surfaced error.
    pub fn set_error_handler(&mut self, handler: Box<dyn FnMut(ErrorKind) + Send>) {
        self.engine.set_error_handler(handler);
    }

    /// The most recent surfaced error.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.engine.last_error()
    }

    /// Drops all queued outbound work without completion callbacks.
    pub fn term(&mut self) {
        self.engine.term();
    }

    /// The engine underneath, for observability.
    pub fn engine(&self) -> &Engine<D> {
        &self.engine
    }

    /// Mutable access to the engine and its driver.
    pub fn engine_mut(&mut self) -> &mut Engine<D> {
        &mut self.engine
    }
}
