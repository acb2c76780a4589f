//! Error taxonomy shared by the framer, the engine and the drivers.

use std::io;

use thiserror::Error;

/// Convenience alias over [`ErrorKind`].
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors raised while framing, parsing or shepherding messages.
///
/// Parser-local outcomes (`BadSignature`, `PartialPacket`, ...) are
/// recovered internally and only reach the caller through the receive
/// outcome of a poll; the remaining variants surface through `Result`
/// returns and the registered error handler.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Parser saw a non-sync byte while hunting for a frame start.
    #[error("no frame signature at stream position")]
    BadSignature,
    /// Parser is mid-frame and ran out of bytes this round.
    #[error("partial packet, more bytes required")]
    PartialPacket,
    /// Header parsed and checksum-valid; body or CRC still outstanding or
    /// corrupt.
    #[error("partial packet with validated header")]
    PartialHeaderValid,
    /// Header failed its additive checksum.
    #[error("header checksum mismatch")]
    BadHeaderChecksum,
    /// Advertised body size exceeds the configured body budget.
    #[error("advertised body of {got} bytes exceeds budget of {max}")]
    PacketTooLarge {
        /// Body size claimed by the header.
        got: usize,
        /// Configured body budget.
        max: usize,
    },
    /// Header valid but the frame CRC did not match.
    #[error("frame CRC mismatch")]
    CorruptedPacket,
    /// Socket id outside the configured range.
    #[error("socket id {0} out of range")]
    BadSocketId(u8),
    /// Socket id valid but not bound to any port.
    #[error("socket {0} is not open")]
    SocketNotOpen(u8),
    /// Attempt to bind a socket that is already bound.
    #[error("socket {0} is already open")]
    SocketAlreadyOpen(u8),
    /// Operation on a port that has not been opened.
    #[error("port {0} is not open")]
    PortNotOpen(u8),
    /// The driver refused to open the port.
    #[error("failed to open port {0}")]
    PortOpenFailed(u8),
    /// Caller payload does not fit one frame body.
    #[error("payload of {got} bytes exceeds frame body budget of {max}")]
    DataSizeTooLarge {
        /// Total payload size requested.
        got: usize,
        /// Configured body budget.
        max: usize,
    },
    /// Per-port send queue is at capacity.
    #[error("send queue full on port {0}")]
    QueueFull(u8),
    /// The packet allocator was exhausted.
    #[error("out of packet buffers")]
    OutOfMemory,
    /// All transmission attempts for a message were spent without an ACK.
    #[error("send retries exhausted")]
    SendRetriesFailed,
    /// A listener is already registered on the socket.
    #[error("listener already registered on socket {0}")]
    DuplicateListener(u8),
    /// A precondition on caller-supplied arguments was broken.
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
    /// The parser reached an impossible state.
    #[error("internal parse error")]
    ParseError,
    /// The driver failed to transmit a frame.
    #[error("driver send failure on port {0}")]
    SendFailure(u8),
    /// Entry point used before construction completed.
    #[error("not initialized")]
    NotInitialized,
    /// An internal invariant was violated.
    #[error("software fault")]
    SoftwareFault,
    /// An I/O error bubbled up from a port driver.
    #[error("I/O error: {0:?}")]
    Io(io::ErrorKind),
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(err.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = ErrorKind::PacketTooLarge { got: 99, max: 54 };
        assert_eq!(err.to_string(), "advertised body of 99 bytes exceeds budget of 54");

        let err = ErrorKind::QueueFull(1);
        assert_eq!(err.to_string(), "send queue full on port 1");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        let err: ErrorKind = io_err.into();
        assert_eq!(err, ErrorKind::Io(io::ErrorKind::TimedOut));
    }
}
