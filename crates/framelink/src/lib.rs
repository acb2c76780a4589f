#![warn(missing_docs)]

//! Framelink: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types for moving acknowledged messages over a byte link:
//!
//! - Node and drivers (`Node`, `LoopbackLink`, `UdpLink`)
//! - Listener events (`SocketEvent`)
//! - Core configuration and errors (`Config`, `ErrorKind`)
//!
//! Example
//! ```ignore
//! use framelink::{Node, SocketEvent};
//!
//! // Two loopback ports in one process: socket 0 talks to socket 1.
//! let mut node = Node::loopback();
//! node.open_port(0).unwrap();
//! node.open_port(1).unwrap();
//! node.open_socket(0, 0).unwrap();
//! node.open_socket(1, 1).unwrap();
//!
//! node.listen(1, Box::new(|socket, event| {
//!     if let SocketEvent::Received { payload } = event {
//!         println!("socket {} got {:?}", socket, payload);
//!     }
//! })).unwrap();
//!
//! node.send(0, 1, b"hello").unwrap();
//! for _ in 0..4 {
//!     node.tick();
//! }
//! ```

// Core config and errors
pub use framelink_core::{Config, ErrorKind, PortDriver, PortId, Result};
// Engine: events and the cross-thread send handle
pub use framelink_engine::{Engine, Listener, MessageSender, OutboundMessage, SocketEvent};
// Host: node and drivers
pub use framelink_host::{Clock, LoopbackLink, Node, SystemClock, UdpBinding, UdpLink};
// Protocol: packet model for driver authors and tests
pub use framelink_protocol::{Header, PacketBuffer, PacketType};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Config, ErrorKind, Listener, MessageSender, Node, PortDriver, PortId, Result, SocketEvent,
        UdpBinding,
    };
}
