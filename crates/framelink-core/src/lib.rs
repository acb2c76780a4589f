#![warn(missing_docs)]

//! framelink-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core utilities shared across all
//! layers:
//! - Configuration types
//! - Error handling
//! - Wire-format constants
//! - The port driver contract
//! - Memory utilities (buffer pooling)
//!
//! Protocol-specific logic lives in specialized crates:
//! - `framelink-protocol`: packet model, checksums, receive parser
//! - `framelink-engine`: framer and send/retry/dispatch engine
//! - `framelink-host`: clocks, port drivers, high-level node

/// Wire-format constants shared across layers.
pub mod constants {
    /// First frame synchronization byte.
    pub const SYNC_1: u8 = 0xBE;
    /// Second frame synchronization byte.
    pub const SYNC_2: u8 = 0xEF;
    /// The size of the packet header, including both sync bytes and the
    /// trailing additive checksum octet.
    pub const HEADER_SIZE: usize = 8;
    /// The size of the packet footer (little-endian CRC-16).
    pub const FOOTER_SIZE: usize = 2;
    /// Header plus footer overhead of every frame.
    pub const PACKET_OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;
    /// Hard ceiling on the total frame size.
    ///
    /// The body-size field is a single octet, so no configuration may push a
    /// frame beyond 256 bytes on the wire.
    pub const MAX_WIRE_PACKET: usize = 256;
}

/// Memory utilities (buffer pooling).
pub mod buffer;
/// Configuration options for the protocol and drivers.
pub mod config;
/// Error types and results.
pub mod error;
/// Port driver contract for pluggable byte links.
pub mod link;

pub use buffer::BufferPool;
pub use config::Config;
pub use error::{ErrorKind, Result};
pub use link::{PortDriver, PortId};
