use ocawire_types::TypeError;

/// Errors that can occur during PDU or message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with the sync byte.
    #[error("bad sync value 0x{found:02x} at offset {offset} (expected 0x3b)")]
    BadSync { offset: usize, found: u8 },

    /// The header names a message type outside 0..=4.
    #[error("bad message type {0}")]
    UnknownMessageType(u8),

    /// A KeepAlive frame must carry exactly one PDU.
    #[error("bad KeepAlive message count {0} (expected 1)")]
    KeepAliveCount(u16),

    /// The PDUs did not end exactly where the frame size field said they would.
    #[error("decode error: PDUs ended at {actual}, frame ends at {expected}")]
    CursorMismatch { expected: usize, actual: usize },

    /// A PDU's embedded length is smaller than its own fixed header.
    #[error("bad {pdu} length {length} (header alone is {minimum} bytes)")]
    PduLength {
        pdu: &'static str,
        length: u32,
        minimum: usize,
    },

    /// A PDU claims more bytes than remain in its frame.
    #[error("{pdu} at offset {offset} needs {needed} bytes, frame has {available} left")]
    PduOverrun {
        pdu: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The bytes left for a KeepAlive are neither 2 nor 4.
    #[error("bad KeepAlive timeout length {0}")]
    KeepAliveLength(usize),

    /// A KeepAlive interval does not fit the 32-bit millisecond field.
    #[error("KeepAlive interval {0} ms does not fit in 32 bits")]
    KeepAliveRange(u64),

    /// PDUs of different message types were combined in one frame.
    #[error("cannot combine {first:?} and {other:?} in one message")]
    MixedMessageTypes {
        first: crate::pdu::MessageType,
        other: crate::pdu::MessageType,
    },

    /// A frame needs at least one PDU.
    #[error("cannot encode an empty message")]
    EmptyMessage,

    /// The PDU count does not fit the 16-bit header field.
    #[error("too many PDUs in one message ({0})")]
    TooManyPdus(usize),

    /// A Command-with-response was sent without a correlation handle.
    #[error("command with response requires a non-zero handle")]
    UnassignedHandle,

    /// A context blob, parameter payload or frame is too large for its length field.
    #[error("{what} too large ({size} bytes, max {max})")]
    TooLarge {
        what: &'static str,
        size: usize,
        max: usize,
    },

    /// The frame header declares more bytes than the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A previous fatal error left the stream in an unknown state.
    #[error("stream is corrupt after an earlier framing error")]
    StreamCorrupt,

    /// Bytes written differ from the length computed before encoding.
    #[error("bad message length calculation: wrote {actual}, expected {expected}")]
    EncodedLength { expected: usize, actual: usize },

    /// Parameter or field encoding failed.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
