//! Memory loopback driver.
//!
//! Wires ports together pairwise in memory: bytes sent on an even port
//! arrive on the next odd port and vice versa (`0 <-> 1`, `2 <-> 3`, ...).
//! Useful for tests and single-process demos where both endpoints of a link
//! live in the same node.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use framelink_core::{ErrorKind, PortDriver, PortId, Result};

struct Lane {
    /// Bytes arriving on this port.
    rx: Receiver<u8>,
    /// Transmissions land on the paired port.
    peer_tx: Sender<u8>,
    open: bool,
}

/// In-memory byte link pairing adjacent ports.
pub struct LoopbackLink {
    lanes: Vec<Lane>,
    power_save: bool,
}

impl LoopbackLink {
    /// Creates `port_count` ports wired pairwise. `port_count` must be even
    /// so every port has a peer.
    pub fn new(port_count: u8) -> Self {
        assert!(port_count % 2 == 0, "loopback ports come in pairs");
        let mut lanes = Vec::with_capacity(port_count as usize);
        for _ in 0..port_count / 2 {
            let (a_tx, a_rx) = unbounded();
            let (b_tx, b_rx) = unbounded();
            lanes.push(Lane { rx: a_rx, peer_tx: b_tx, open: false });
            lanes.push(Lane { rx: b_rx, peer_tx: a_tx, open: false });
        }
        Self { lanes, power_save: false }
    }

    /// Whether the engine last requested power save.
    pub fn is_power_save(&self) -> bool {
        self.power_save
    }

    fn lane(&self, port: PortId) -> Result<&Lane> {
        self.lanes.get(port as usize).ok_or(ErrorKind::PortNotOpen(port))
    }
}

impl PortDriver for LoopbackLink {
    fn open(&mut self, port: PortId) -> Result<()> {
        let lane = self
            .lanes
            .get_mut(port as usize)
            .ok_or(ErrorKind::PortOpenFailed(port))?;
        lane.open = true;
        Ok(())
    }

    fn is_open(&self, port: PortId) -> bool {
        self.lanes.get(port as usize).map_or(false, |lane| lane.open)
    }

    fn send(&mut self, port: PortId, buf: &[u8]) -> Result<()> {
        let lane = self.lane(port)?;
        for &byte in buf {
            lane.peer_tx
                .send(byte)
                .map_err(|_| ErrorKind::SendFailure(port))?;
        }
        Ok(())
    }

    fn recv(&mut self, port: PortId, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        // Memory lanes never need to wait: whatever is queued is already
        // here, so the timeout collapses to an immediate check.
        let lane = self.lane(port)?;
        let mut n = 0;
        while n < buf.len() {
            match lane.rx.try_recv() {
                Ok(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(ErrorKind::PortNotOpen(port)),
            }
        }
        Ok(n)
    }

    fn flush(&mut self, port: PortId) {
        if let Ok(lane) = self.lane(port) {
            while lane.rx.try_recv().is_ok() {}
        }
    }

    fn is_recv_queue_empty(&self, port: PortId) -> bool {
        self.lane(port).map_or(true, |lane| lane.rx.is_empty())
    }

    fn power_save(&mut self, enabled: bool) {
        self.power_save = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_are_cross_wired() {
        let mut link = LoopbackLink::new(2);
        link.open(0).unwrap();
        link.open(1).unwrap();

        link.send(0, b"abc").unwrap();
        assert!(link.is_recv_queue_empty(0));
        assert!(!link.is_recv_queue_empty(1));

        let mut buf = [0u8; 8];
        let n = link.recv(1, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], b"abc");
        assert!(link.is_recv_queue_empty(1));
    }

    #[test]
    fn test_recv_on_empty_lane_returns_zero() {
        let mut link = LoopbackLink::new(2);
        link.open(0).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(link.recv(0, &mut buf, Duration::from_millis(10)).unwrap(), 0);
    }

    #[test]
    fn test_flush_discards_buffered_bytes() {
        let mut link = LoopbackLink::new(2);
        link.open(0).unwrap();
        link.open(1).unwrap();

        link.send(0, b"stale").unwrap();
        link.flush(1);
        assert!(link.is_recv_queue_empty(1));
    }

    #[test]
    fn test_second_pair_is_independent() {
        let mut link = LoopbackLink::new(4);
        for port in 0..4 {
            link.open(port).unwrap();
        }

        link.send(2, b"x").unwrap();
        assert!(link.is_recv_queue_empty(0));
        assert!(link.is_recv_queue_empty(1));
        assert!(!link.is_recv_queue_empty(3));
    }
}
