//! Stream reassembly: recover frame boundaries from arbitrarily chunked input.

use bytes::BytesMut;

use crate::codec::{decode_message_with_config, FrameConfig};
use crate::error::{FrameError, Result};
use crate::pdu::Pdu;

/// Receives the PDUs of each complete frame, in arrival order.
pub trait Incoming {
    fn incoming(&mut self, pdus: Vec<Pdu>);
}

impl<F> Incoming for F
where
    F: FnMut(Vec<Pdu>),
{
    fn incoming(&mut self, pdus: Vec<Pdu>) {
        self(pdus)
    }
}

/// Collects every delivered frame.
impl Incoming for Vec<Vec<Pdu>> {
    fn incoming(&mut self, pdus: Vec<Pdu>) {
        self.push(pdus);
    }
}

/// Reassembles frames from one byte stream and hands them to `H`.
///
/// The connection is idle when no partial frame is buffered, and waiting for
/// more otherwise. Chunk delivery needs `&mut self`, so calls on one stream
/// are serialised by construction.
///
/// A framing error is fatal: the connection drops its buffer and rejects all
/// further input with [`FrameError::StreamCorrupt`]. There is no attempt to
/// resynchronise on the next sync byte.
#[derive(Debug)]
pub struct Connection<H> {
    handler: H,
    pending: BytesMut,
    config: FrameConfig,
    poisoned: bool,
}

impl<H: Incoming> Connection<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, FrameConfig::default())
    }

    pub fn with_config(handler: H, config: FrameConfig) -> Self {
        Self {
            handler,
            pending: BytesMut::new(),
            config,
            poisoned: false,
        }
    }

    /// Feed one chunk of the stream. Returns the number of frames delivered.
    pub fn read(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.poisoned {
            return Err(FrameError::StreamCorrupt);
        }
        if self.pending.is_empty() {
            return self.drain(chunk);
        }

        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);
        self.drain(&buf)
    }

    fn drain(&mut self, buf: &[u8]) -> Result<usize> {
        let mut pos = 0usize;
        let mut delivered = 0usize;

        while pos < buf.len() {
            match decode_message_with_config(buf, pos, &self.config) {
                Ok(Some((pdus, end))) => {
                    pos = end;
                    delivered += 1;
                    self.handler.incoming(pdus);
                }
                Ok(None) => {
                    self.pending.extend_from_slice(&buf[pos..]);
                    tracing::trace!(pending = self.pending.len(), "awaiting rest of frame");
                    break;
                }
                Err(err) => {
                    self.poisoned = true;
                    self.pending.clear();
                    tracing::error!(error = %err, offset = pos, "framing error, dropping stream");
                    return Err(err);
                }
            }
        }

        Ok(delivered)
    }

    /// Bytes of an incomplete frame waiting for more input.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether an earlier framing error has shut the connection.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_message, HEADER_SIZE};
    use crate::pdu::{Command, KeepAlive, Response};

    fn sample_stream() -> (Vec<u8>, Vec<Vec<Pdu>>) {
        let frames = vec![
            vec![Pdu::Command(Command::new(7, 1, 2))],
            vec![
                Pdu::Response(Response::new(1, 0).with_parameters(1, vec![9; 40])),
                Pdu::Response(Response::new(2, 3)),
            ],
            vec![Pdu::KeepAlive(KeepAlive::from_millis(2500))],
        ];
        let wire = frames
            .iter()
            .flat_map(|pdus| encode_message(pdus).unwrap())
            .collect();
        (wire, frames)
    }

    #[test]
    fn delivers_whole_stream_in_one_chunk() {
        let (wire, frames) = sample_stream();
        let mut conn = Connection::new(Vec::<Vec<Pdu>>::new());
        assert_eq!(conn.read(&wire).unwrap(), 3);
        assert!(conn.is_idle());
        assert_eq!(conn.into_handler(), frames);
    }

    #[test]
    fn byte_by_byte_delivery() {
        let (wire, frames) = sample_stream();
        let mut conn = Connection::new(Vec::<Vec<Pdu>>::new());
        for byte in &wire {
            conn.read(std::slice::from_ref(byte)).unwrap();
        }
        assert!(conn.is_idle());
        assert_eq!(conn.handler(), &frames);
    }

    #[test]
    fn split_inside_header_keeps_tail() {
        let (wire, frames) = sample_stream();
        let mut conn = Connection::new(Vec::<Vec<Pdu>>::new());

        assert_eq!(conn.read(&wire[..HEADER_SIZE - 3]).unwrap(), 0);
        assert_eq!(conn.pending_len(), HEADER_SIZE - 3);
        assert!(!conn.is_idle());

        assert_eq!(conn.read(&wire[HEADER_SIZE - 3..]).unwrap(), 3);
        assert!(conn.is_idle());
        assert_eq!(conn.handler(), &frames);
    }

    #[test]
    fn closure_handler_sees_frames_in_order() {
        let (wire, _) = sample_stream();
        let mut seen = Vec::new();
        {
            let mut conn = Connection::new(|pdus: Vec<Pdu>| {
                seen.push(pdus[0].message_type());
            });
            let (head, tail) = wire.split_at(30);
            conn.read(head).unwrap();
            conn.read(tail).unwrap();
        }
        assert_eq!(
            seen,
            vec![
                crate::pdu::MessageType::Command,
                crate::pdu::MessageType::Response,
                crate::pdu::MessageType::KeepAlive
            ]
        );
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut conn = Connection::new(Vec::<Vec<Pdu>>::new());
        assert_eq!(conn.read(&[]).unwrap(), 0);
        assert!(conn.is_idle());
    }

    #[test]
    fn framing_error_poisons_connection() {
        let (mut wire, _) = sample_stream();
        // Corrupt the sync byte of the second frame.
        wire[27] = 0x00;

        let mut conn = Connection::new(Vec::<Vec<Pdu>>::new());
        let err = conn.read(&wire).unwrap_err();
        assert!(matches!(err, FrameError::BadSync { offset: 27, .. }));
        assert!(conn.is_poisoned());
        assert_eq!(conn.handler().len(), 1);
        assert_eq!(conn.pending_len(), 0);

        assert!(matches!(conn.read(&wire[..10]), Err(FrameError::StreamCorrupt)));
    }

    #[test]
    fn oversize_declaration_poisons_connection() {
        let (wire, _) = sample_stream();
        let config = FrameConfig { max_frame_size: 20 };
        let mut conn = Connection::with_config(Vec::<Vec<Pdu>>::new(), config);
        assert!(matches!(
            conn.read(&wire),
            Err(FrameError::FrameTooLarge { size: 26, max: 20 })
        ));
    }
}
