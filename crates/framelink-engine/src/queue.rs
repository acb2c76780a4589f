//! Per-port send queue.
//!
//! Each port owns one insertion-ordered queue of pending outbound messages.
//! Only the head entry may progress beyond [`SendState::Send`]; everything
//! behind it waits for head completion, which is what preserves per-port
//! send order. ACK and NAK responses are matched against entries by the
//! (destination, source, transaction) triple rather than by position, so a
//! late control packet cannot detach the wrong message.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use framelink_protocol::{Header, PacketBuffer};

/// Transmission state of one queued message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendState {
    /// Ready to transmit (or retransmit) when it reaches the queue head.
    Send,
    /// Transmitted; waiting for the remote ACK.
    AwaitAck,
}

/// One pending outbound message on one port.
#[derive(Debug)]
pub struct SendEntry {
    /// The framed packet to put on the wire.
    pub buffer: PacketBuffer,
    /// Where this entry stands in the send state machine.
    pub state: SendState,
    /// Transmission attempts made so far.
    pub retries: u32,
    /// When the driver last accepted this entry; `None` before the first
    /// attempt.
    pub last_send: Option<Instant>,
}

impl SendEntry {
    /// Wraps a freshly built packet, ready for its first attempt.
    pub fn new(buffer: PacketBuffer) -> Self {
        Self { buffer, state: SendState::Send, retries: 0, last_send: None }
    }

    /// Whether a control packet with header `reply` answers this entry:
    /// the reply's source is our destination, its destination our source,
    /// and the transaction id matches.
    fn answered_by(&self, reply: &Header) -> bool {
        let ours = self.buffer.header();
        ours.dest == reply.src && ours.src == reply.dest && ours.trans_id == reply.trans_id
    }
}

/// Insertion-ordered queue of pending messages for one port.
#[derive(Debug, Default)]
pub struct SendQueue {
    entries: VecDeque<SendEntry>,
}

impl SendQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a message at the tail.
    pub fn push_back(&mut self, entry: SendEntry) {
        self.entries.push_back(entry);
    }

    /// The head entry, if any.
    pub fn front(&self) -> Option<&SendEntry> {
        self.entries.front()
    }

    /// Mutable head entry, if any.
    pub fn front_mut(&mut self) -> Option<&mut SendEntry> {
        self.entries.front_mut()
    }

    /// Removes and returns the head entry.
    pub fn pop_front(&mut self) -> Option<SendEntry> {
        self.entries.pop_front()
    }

    /// Removes and returns the first entry answered by `reply`.
    pub fn remove_answered(&mut self, reply: &Header) -> Option<SendEntry> {
        let at = self.entries.iter().position(|entry| entry.answered_by(reply))?;
        self.entries.remove(at)
    }

    /// Mutable access to the first entry answered by `reply`.
    pub fn answered_mut(&mut self, reply: &Header) -> Option<&mut SendEntry> {
        self.entries.iter_mut().find(|entry| entry.answered_by(reply))
    }

    /// Flips every entry whose ACK wait exceeded `timeout` back to
    /// [`SendState::Send`], in any queue position. Only the head can
    /// actually retransmit, but the sweep covers all entries. Returns how
    /// many expired.
    pub fn expire_awaiting(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut expired = 0;
        for entry in self.entries.iter_mut() {
            if entry.state == SendState::AwaitAck {
                if let Some(sent_at) = entry.last_send {
                    if now.duration_since(sent_at) > timeout {
                        entry.state = SendState::Send;
                        expired += 1;
                    }
                }
            }
        }
        expired
    }

    /// Drops every entry, returning their backing buffers for recycling.
    pub fn clear(&mut self) -> impl Iterator<Item = SendEntry> + '_ {
        self.entries.drain(..)
    }
}
