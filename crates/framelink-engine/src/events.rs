//! Listener events and registration.
//!
//! Listeners are invoked synchronously from inside `tick`. A received
//! payload borrows the shared receive buffer and expires when the callback
//! returns; listeners that need the bytes later must copy them. A listener
//! wanting to send from inside the callback uses the engine's cloned
//! [`MessageSender`](crate::engine::MessageSender) handle rather than the
//! engine itself.

use framelink_core::{ErrorKind, Result};

/// Event delivered to the listener registered on a socket.
#[derive(Debug)]
pub enum SocketEvent<'a> {
    /// A DATA payload arrived on the socket. The slice borrows the shared
    /// receive buffer and is invalidated on return from the callback.
    Received {
        /// The frame body.
        payload: &'a [u8],
    },
    /// An outbound message finished: `Ok` once the remote acknowledged it,
    /// `Err(SendRetriesFailed)` when every attempt went unanswered.
    SendComplete {
        /// Final disposition of the message.
        result: Result<()>,
    },
}

/// Callback bound to one socket. The first argument is the socket id the
/// event belongs to.
pub type Listener = Box<dyn FnMut(u8, SocketEvent<'_>) + Send>;

/// At most one listener per socket; re-registration is rejected.
pub struct ListenerTable {
    slots: Vec<Option<Listener>>,
}

impl ListenerTable {
    /// Creates a table with `socket_max` empty slots.
    pub fn new(socket_max: u8) -> Self {
        let mut slots = Vec::with_capacity(socket_max as usize);
        slots.resize_with(socket_max as usize, || None);
        Self { slots }
    }

    /// Installs `listener` on `socket`.
    pub fn register(&mut self, socket: u8, listener: Listener) -> Result<()> {
        let slot = self
            .slots
            .get_mut(socket as usize)
            .ok_or(ErrorKind::BadSocketId(socket))?;
        if slot.is_some() {
            return Err(ErrorKind::DuplicateListener(socket));
        }
        *slot = Some(listener);
        Ok(())
    }

    /// Whether a listener is installed on `socket`.
    pub fn is_registered(&self, socket: u8) -> bool {
        matches!(self.slots.get(socket as usize), Some(Some(_)))
    }

    /// The listener on `socket`, if any.
    pub fn get_mut(&mut self, socket: u8) -> Option<&mut Listener> {
        self.slots.get_mut(socket as usize).and_then(|slot| slot.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once() {
        let mut table = ListenerTable::new(4);
        assert!(!table.is_registered(2));

        table.register(2, Box::new(|_, _| {})).unwrap();
        assert!(table.is_registered(2));

        let err = table.register(2, Box::new(|_, _| {})).unwrap_err();
        assert_eq!(err, ErrorKind::DuplicateListener(2));
    }

    #[test]
    fn test_out_of_range_socket_rejected() {
        let mut table = ListenerTable::new(4);
        let err = table.register(9, Box::new(|_, _| {})).unwrap_err();
        assert_eq!(err, ErrorKind::BadSocketId(9));
    }

    #[test]
    fn test_callback_receives_socket_and_event() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut table = ListenerTable::new(2);
        table
            .register(
                1,
                Box::new(move |socket, event| {
                    if let SocketEvent::Received { payload } = event {
                        sink.lock().unwrap().push((socket, payload.to_vec()));
                    }
                }),
            )
            .unwrap();

        let callback = table.get_mut(1).unwrap();
        callback(1, SocketEvent::Received { payload: b"ping" });

        assert_eq!(seen.lock().unwrap().as_slice(), &[(1, b"ping".to_vec())]);
    }
}
