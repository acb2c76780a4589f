//! Port driver contract for pluggable byte links.

use std::time::Duration;

use crate::error::Result;

/// Identifies one physical byte-oriented link. Ports are numbered from zero
/// up to `Config::port_max`.
pub type PortId = u8;

/// Low-level byte link abstraction.
///
/// This trait allows various links (serial UART, CAN, SPI, BLE, UDP, memory
/// loopback) to be plugged into the framer without coupling to a concrete
/// implementation. One driver instance serves every port of a node; each
/// operation names the port it acts on.
pub trait PortDriver {
    /// Prepares the link behind `port` for traffic.
    fn open(&mut self, port: PortId) -> Result<()>;

    /// Returns whether `port` is currently open.
    fn is_open(&self, port: PortId) -> bool;

    /// Transmits the whole buffer on `port`, or fails. Expected to be
    /// non-blocking or bounded best-effort.
    fn send(&mut self, port: PortId, buf: &[u8]) -> Result<()>;

    /// Reads up to `buf.len()` bytes from `port` into `buf`, returning the
    /// number of bytes actually read (zero means nothing buffered). Must not
    /// exceed `timeout` by much.
    fn recv(&mut self, port: PortId, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discards any buffered inbound data on `port`.
    fn flush(&mut self, port: PortId);

    /// Non-blocking hint: is there nothing to read on `port` right now?
    fn is_recv_queue_empty(&self, port: PortId) -> bool;

    /// Advisory power-save hint from the engine. Drivers may ignore it.
    fn power_save(&mut self, enabled: bool);
}
