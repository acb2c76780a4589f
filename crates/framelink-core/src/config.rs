use std::{default::Default, time::Duration};

use crate::constants::{MAX_WIRE_PACKET, PACKET_OVERHEAD};

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and driver behavior.
pub struct Config {
    /// Max wait for the remote peer's ACK before the head-of-queue message
    /// becomes eligible for retransmission.
    pub ack_timeout: Duration,
    /// Total transmission attempts before failing a message out and
    /// notifying its listener with `SendRetriesFailed`.
    pub max_retries: u32,
    /// Upper bound on a single driver `recv` call inside the receive poll.
    /// Small values keep the tick loop responsive.
    pub recv_timeout: Duration,
    /// Max queued outgoing messages per port.
    pub max_messages: usize,
    /// Max total on-wire frame size including header, body and CRC.
    /// Must not exceed 256 because the body-size field is one octet.
    pub max_packet_size: usize,
    /// Number of socket-id slots. Socket ids range over `0..socket_max`.
    pub socket_max: u8,
    /// Number of physical ports. Port ids range over `0..port_max`.
    pub port_max: u8,
    /// Driver receive buffer size in bytes (None = use system default).
    /// Applied by drivers that expose an OS socket (SO_RCVBUF).
    pub recv_buffer_size: Option<usize>,
    /// Driver send buffer size in bytes (None = use system default).
    /// Applied by drivers that expose an OS socket (SO_SNDBUF).
    pub send_buffer_size: Option<usize>,
}

impl Config {
    /// Max payload bytes carried by one frame under this configuration.
    /// Clamped between the frame overhead and the one-octet wire ceiling.
    pub fn max_body(&self) -> usize {
        self.max_packet_size.clamp(PACKET_OVERHEAD, MAX_WIRE_PACKET) - PACKET_OVERHEAD
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(200),
            recv_timeout: Duration::from_millis(10),
            max_retries: 4,
            max_messages: 5,
            max_packet_size: 64,
            socket_max: 8,
            port_max: 2,
            recv_buffer_size: None, // Use system default
            send_buffer_size: None, // Use system default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_body_budget() {
        let config = Config::default();
        assert_eq!(config.max_body(), 54);
    }

    #[test]
    fn test_body_budget_clamps_to_wire_ceiling() {
        let config = Config { max_packet_size: 1024, ..Config::default() };
        // A one-octet body-size field cannot address past a 256-byte frame.
        assert_eq!(config.max_body(), 246);
    }
}
