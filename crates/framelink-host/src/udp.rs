//! UDP port driver.
//!
//! Maps each port onto one non-blocking `UdpSocket` with a fixed peer
//! address. A whole frame travels in one datagram, but bytes are surfaced
//! to the framer incrementally through a carry-over buffer so the parser's
//! byte-at-a-time contract holds regardless of datagram boundaries.

use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use socket2::Socket as Socket2;
use tracing::error;

use framelink_core::{Config, ErrorKind, PortDriver, PortId, Result};

/// One port's addresses: where to bind and who the remote peer is.
#[derive(Clone, Debug)]
pub struct UdpBinding {
    /// Port id this binding serves.
    pub port: PortId,
    /// Local bind address.
    pub local: SocketAddr,
    /// Remote peer address frames are exchanged with.
    pub peer: SocketAddr,
}

struct Endpoint {
    socket: UdpSocket,
    peer: SocketAddr,
    /// Bytes of received datagrams not yet consumed by the framer.
    pending: VecDeque<u8>,
    open: bool,
}

/// Port driver exchanging frames over UDP datagrams.
pub struct UdpLink {
    endpoints: Vec<Option<Endpoint>>,
    /// Scratch for whole incoming datagrams.
    datagram: Vec<u8>,
}

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    // Work on a duplicated descriptor; dropping it leaves the original open.
    let socket2 = Socket2::from(socket.try_clone()?);
    if let Some(size) = config.recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    Ok(())
}

impl UdpLink {
    /// Binds one socket per entry in `bindings`. Ports not listed stay
    /// unusable.
    pub fn bind(bindings: &[UdpBinding], config: &Config) -> Result<Self> {
        let mut endpoints = Vec::new();
        endpoints.resize_with(config.port_max as usize, || None);

        for binding in bindings {
            if binding.port >= config.port_max {
                return Err(ErrorKind::BadArgument("port id out of range"));
            }
            let socket = UdpSocket::bind(binding.local)?;
            socket.set_nonblocking(true)?;
            apply_socket_options(&socket, config)?;
            endpoints[binding.port as usize] = Some(Endpoint {
                socket,
                peer: binding.peer,
                pending: VecDeque::new(),
                open: false,
            });
        }

        Ok(Self { endpoints, datagram: vec![0; 2048] })
    }

    /// The local address a port's socket is bound to.
    pub fn local_addr(&self, port: PortId) -> Result<SocketAddr> {
        let endpoint = self
            .endpoints
            .get(port as usize)
            .and_then(Option::as_ref)
            .ok_or(ErrorKind::PortNotOpen(port))?;
        Ok(endpoint.socket.local_addr()?)
    }

    fn endpoint_mut(&mut self, port: PortId) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(port as usize)
            .and_then(Option::as_mut)
            .ok_or(ErrorKind::PortNotOpen(port))
    }

    /// Pulls any waiting datagram from `port`'s socket into its carry-over
    /// buffer. Datagrams from other senders than the configured peer are
    /// dropped.
    fn refill(endpoint: &mut Endpoint, datagram: &mut [u8]) {
        loop {
            match endpoint.socket.recv_from(datagram) {
                Ok((n, from)) => {
                    if from == endpoint.peer {
                        endpoint.pending.extend(&datagram[..n]);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    error!(%err, "udp receive failed");
                    break;
                }
            }
        }
    }
}

impl PortDriver for UdpLink {
    fn open(&mut self, port: PortId) -> Result<()> {
        self.endpoint_mut(port)
            .map(|endpoint| endpoint.open = true)
            .map_err(|_| ErrorKind::PortOpenFailed(port))
    }

    fn is_open(&self, port: PortId) -> bool {
        self.endpoints
            .get(port as usize)
            .and_then(Option::as_ref)
            .map_or(false, |endpoint| endpoint.open)
    }

    fn send(&mut self, port: PortId, buf: &[u8]) -> Result<()> {
        let endpoint = self.endpoint_mut(port)?;
        let peer = endpoint.peer;
        endpoint.socket.send_to(buf, peer)?;
        Ok(())
    }

    fn recv(&mut self, port: PortId, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        // Non-blocking: an empty socket reports zero bytes immediately,
        // which is within the contract's timeout upper bound.
        let (endpoints, datagram) = (&mut self.endpoints, &mut self.datagram);
        let endpoint = endpoints
            .get_mut(port as usize)
            .and_then(Option::as_mut)
            .ok_or(ErrorKind::PortNotOpen(port))?;

        if endpoint.pending.is_empty() {
            Self::refill(endpoint, datagram);
        }

        let mut n = 0;
        while n < buf.len() {
            match endpoint.pending.pop_front() {
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
        if let Ok(endpoint) = self.endpoint_mut(port) {
            endpoint.pending.clear();
        }
    }

    fn is_recv_queue_empty(&self, port: PortId) -> bool {
        let endpoint = match self.endpoints.get(port as usize).and_then(Option::as_ref) {
            Some(endpoint) => endpoint,
            None => return true,
        };
        if !endpoint.pending.is_empty() {
            return false;
        }
        let mut probe = [0u8; 1];
        match endpoint.socket.peek_from(&mut probe) {
            Ok(_) => false,
            Err(_) => true,
        }
    }

    fn power_save(&mut self, _enabled: bool) {
        // Nothing to do for UDP; the hint matters for radio-style links.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (UdpLink, UdpLink) {
        let config = Config::default();
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();

        // Bind both sides on ephemeral ports, then point them at each other.
        let a = UdpLink::bind(&[UdpBinding { port: 0, local: any, peer: any }], &config).unwrap();
        let b = UdpLink::bind(&[UdpBinding { port: 0, local: any, peer: any }], &config).unwrap();
        let a_addr = a.local_addr(0).unwrap();
        let b_addr = b.local_addr(0).unwrap();

        let mut a = a;
        let mut b = b;
        a.endpoints[0].as_mut().unwrap().peer = b_addr;
        b.endpoints[0].as_mut().unwrap().peer = a_addr;
        (a, b)
    }

    #[test]
    fn test_datagram_bytes_surface_incrementally() {
        let (mut a, mut b) = pair();
        a.open(0).unwrap();
        b.open(0).unwrap();

        a.send(0, b"frame-bytes").unwrap();

        // Allow the datagram to land.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while b.is_recv_queue_empty(0) && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }

        let mut collected = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = b.recv(0, &mut byte, Duration::from_millis(10)).unwrap();
            if n == 0 {
                break;
            }
            collected.push(byte[0]);
        }
        assert_eq!(collected, b"frame-bytes");
    }

    #[test]
    fn test_unconfigured_port_reports_not_open() {
        let config = Config::default();
        let link = UdpLink::bind(&[], &config).unwrap();
        assert!(!link.is_open(0));
        assert!(link.is_recv_queue_empty(0));
    }
}
