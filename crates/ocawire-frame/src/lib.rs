//! OCP.1 PDUs, message framing and stream reassembly.
//!
//! Every message is framed with:
//! - A sync byte (0x3b) for stream synchronization
//! - A 2-byte protocol version and a 4-byte big-endian size
//! - A message type and a PDU count; all PDUs in a frame share the type
//!
//! [`Connection`] turns an arbitrarily chunked byte stream back into frames,
//! [`FrameReader`] and [`FrameWriter`] do the same over blocking I/O.

pub mod codec;
pub mod connection;
pub mod error;
pub mod pdu;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::OcaCodec;
pub use codec::{
    decode_message, decode_message_with_config, encode_message, encode_message_into,
    FrameConfig, DEFAULT_MAX_FRAME, HEADER_SIZE, PROTOCOL_VERSION, SYNC,
};
pub use connection::{Connection, Incoming};
pub use error::{FrameError, Result};
pub use pdu::{
    Command, Event, EventId, HandleAllocator, KeepAlive, MessageType, Notification, Parameters,
    Pdu, Response,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;
