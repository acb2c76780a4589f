#![warn(missing_docs)]

//! framelink-engine: framer and protocol engine state machines.

/// Protocol engine: queues, retries, ACK/NAK synthesis, dispatch.
pub mod engine;
/// Listener events and registration.
pub mod events;
/// Framer: socket/port management and the receive poll loop.
pub mod framer;
/// Per-port send queue.
pub mod queue;

pub use engine::{Engine, MessageSender, OutboundMessage};
pub use events::{Listener, SocketEvent};
pub use framer::{Framer, ReceiveOutcome};
pub use queue::{SendEntry, SendQueue, SendState};
