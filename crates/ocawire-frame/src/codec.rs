use bytes::BytesMut;
use ocawire_types::cursor::{ReadCursor, WriteCursor};

use crate::error::{FrameError, Result};
use crate::pdu::{MessageType, Pdu};

/// First byte of every frame.
pub const SYNC: u8 = 0x3b;

/// Protocol version written into every frame header.
pub const PROTOCOL_VERSION: u16 = 1;

/// Frame header: sync (1) + version (2) + size (4) + type (1) + count (2) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Default maximum declared frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Configuration for the message framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest size field a frame header may declare. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Header fields and total length of a message about to be encoded.
struct Plan {
    message_type: MessageType,
    count: u16,
    len: usize,
}

/// Validate a PDU sequence and compute the frame length before any byte is written.
fn plan(pdus: &[Pdu]) -> Result<Plan> {
    let first = pdus.first().ok_or(FrameError::EmptyMessage)?;
    let message_type = first.message_type();
    let count = u16::try_from(pdus.len()).map_err(|_| FrameError::TooManyPdus(pdus.len()))?;
    if message_type == MessageType::KeepAlive && count != 1 {
        return Err(FrameError::KeepAliveCount(count));
    }

    let mut len = HEADER_SIZE;
    for pdu in pdus {
        if pdu.message_type() != message_type {
            return Err(FrameError::MixedMessageTypes {
                first: message_type,
                other: pdu.message_type(),
            });
        }
        pdu.validate()?;
        len = len
            .checked_add(pdu.encoded_length())
            .ok_or(FrameError::TooLarge {
                what: "message",
                size: usize::MAX,
                max: u32::MAX as usize,
            })?;
    }

    Ok(Plan {
        message_type,
        count,
        len,
    })
}

fn write_message(dst: &mut [u8], plan: &Plan, pdus: &[Pdu]) -> Result<usize> {
    let size = u32::try_from(plan.len - 1).map_err(|_| FrameError::TooLarge {
        what: "message",
        size: plan.len,
        max: u32::MAX as usize,
    })?;

    let mut cur = WriteCursor::new(dst);
    cur.put_u8(SYNC)?;
    cur.put_u16(PROTOCOL_VERSION)?;
    cur.put_u32(size)?;
    cur.put_u8(plan.message_type.code())?;
    cur.put_u16(plan.count)?;

    let mut pos = cur.position();
    for pdu in pdus {
        pos = pdu.encode_to(dst, pos)?;
    }
    if pos != plan.len {
        return Err(FrameError::EncodedLength {
            expected: plan.len,
            actual: pos,
        });
    }
    Ok(pos)
}

/// Encode a homogeneous PDU sequence as one frame.
///
/// Wire format (big-endian):
/// ```text
/// ┌──────────┬─────────────┬────────────┬──────────┬────────────┬──────────────┐
/// │ Sync (1) │ Version (2) │ Size (4)   │ Type (1) │ Count (2)  │ PDUs         │
/// │ 0x3b     │ 1           │ total - 1  │ 0..=4    │            │ Count × Type │
/// └──────────┴─────────────┴────────────┴──────────┴────────────┴──────────────┘
/// ```
///
/// Mixed message types, an empty slice and a Command-with-response without a
/// handle are all rejected before anything is written.
pub fn encode_message(pdus: &[Pdu]) -> Result<Vec<u8>> {
    let plan = plan(pdus)?;
    let mut out = vec![0u8; plan.len];
    write_message(&mut out, &plan, pdus)?;
    tracing::trace!(
        message_type = plan.message_type.name(),
        pdus = plan.count,
        bytes = plan.len,
        "encoded message"
    );
    Ok(out)
}

/// Encode a frame and append it to `dst`. On error `dst` is left unchanged.
pub fn encode_message_into(pdus: &[Pdu], dst: &mut BytesMut) -> Result<()> {
    let plan = plan(pdus)?;
    let start = dst.len();
    dst.resize(start + plan.len, 0);
    if let Err(err) = write_message(&mut dst[start..], &plan, pdus) {
        dst.truncate(start);
        return Err(err);
    }
    Ok(())
}

/// Decode one frame starting at `offset`.
///
/// Returns `Ok(None)` if the buffer doesn't contain the whole frame yet; the
/// caller retries from the same offset once more bytes arrive. On success
/// returns the PDUs and the offset just past the frame.
pub fn decode_message(buf: &[u8], offset: usize) -> Result<Option<(Vec<Pdu>, usize)>> {
    decode_message_with_config(buf, offset, &FrameConfig::default())
}

/// [`decode_message`] with an explicit frame size limit.
pub fn decode_message_with_config(
    buf: &[u8],
    offset: usize,
    config: &FrameConfig,
) -> Result<Option<(Vec<Pdu>, usize)>> {
    if buf.len().saturating_sub(offset) < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut cur = ReadCursor::at(buf, offset);
    let sync = cur.read_u8()?;
    if sync != SYNC {
        return Err(FrameError::BadSync {
            offset,
            found: sync,
        });
    }
    let version = cur.read_u16()?;
    let size = cur.read_u32()? as usize;
    let raw_type = cur.read_u8()?;
    let count = cur.read_u16()?;

    if size > config.max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size,
            max: config.max_frame_size,
        });
    }

    // Size counts every byte after the sync byte.
    let end = offset + 1 + size;
    let body = cur.position();
    if end < body {
        return Err(FrameError::CursorMismatch {
            expected: end,
            actual: body,
        });
    }
    if end > buf.len() {
        return Ok(None); // Need more data
    }

    let message_type = MessageType::try_from(raw_type)?;
    if message_type == MessageType::KeepAlive && count != 1 {
        return Err(FrameError::KeepAliveCount(count));
    }

    let mut pos = body;
    let mut pdus = Vec::with_capacity(usize::from(count).min(end - body));
    for _ in 0..count {
        let (pdu, next) = Pdu::decode_from(message_type, buf, pos, end - pos)?;
        pdus.push(pdu);
        pos = next;
    }

    if pos != end {
        return Err(FrameError::CursorMismatch {
            expected: end,
            actual: pos,
        });
    }

    tracing::debug!(
        message_type = message_type.name(),
        version,
        pdus = count,
        bytes = end - offset,
        "decoded message"
    );
    Ok(Some((pdus, end)))
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::pdu::{Command, Event, EventId, KeepAlive, Notification, Response};

    #[test]
    fn command_end_to_end() {
        let command = Command::new(7, 1, 2);
        let wire = encode_message(&[Pdu::Command(command.clone())]).unwrap();

        assert_eq!(wire.len(), HEADER_SIZE + Command::HEADER_LEN);
        assert_eq!(&wire[..3], &[SYNC, 0, 1]);
        assert_eq!(&wire[3..7], &26u32.to_be_bytes());
        assert_eq!(wire[7], MessageType::Command.code());
        assert_eq!(&wire[8..10], &[0, 1]);

        let (pdus, end) = decode_message(&wire, 0).unwrap().unwrap();
        assert_eq!(end, 27);
        assert_eq!(pdus, vec![Pdu::Command(command)]);
    }

    #[test]
    fn every_prefix_is_incomplete() {
        let wire = encode_message(&[
            Pdu::Response(Response::new(1, 0).with_parameters(1, vec![1, 2, 3])),
            Pdu::Response(Response::new(2, 4)),
        ])
        .unwrap();
        for cut in 0..wire.len() {
            assert!(
                decode_message(&wire[..cut], 0).unwrap().is_none(),
                "prefix of {cut} bytes decoded"
            );
        }
        assert!(decode_message(&wire, 0).unwrap().is_some());
    }

    #[test]
    fn decodes_at_offset() {
        let mut wire = vec![0xee, 0xee];
        wire.extend(encode_message(&[Pdu::KeepAlive(KeepAlive::from_millis(1000))]).unwrap());
        let (pdus, end) = decode_message(&wire, 2).unwrap().unwrap();
        assert_eq!(pdus, vec![Pdu::KeepAlive(KeepAlive::from_millis(1000))]);
        assert_eq!(end, wire.len());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_message_into(&[Pdu::KeepAlive(KeepAlive::from_secs(1))], &mut buf).unwrap();
        encode_message_into(&[Pdu::Response(Response::new(9, 0))], &mut buf).unwrap();

        let (first, end) = decode_message(&buf, 0).unwrap().unwrap();
        let (second, end2) = decode_message(&buf, end).unwrap().unwrap();
        assert_eq!(first, vec![Pdu::KeepAlive(KeepAlive::from_secs(1))]);
        assert_eq!(second, vec![Pdu::Response(Response::new(9, 0))]);
        assert_eq!(end2, buf.len());
    }

    #[test]
    fn bad_sync_is_fatal() {
        let mut wire = encode_message(&[Pdu::Command(Command::new(1, 1, 1))]).unwrap();
        wire[0] = 0x3c;
        assert!(matches!(
            decode_message(&wire, 0),
            Err(FrameError::BadSync {
                offset: 0,
                found: 0x3c
            })
        ));
    }

    #[test]
    fn unknown_message_type_is_fatal() {
        let mut wire = encode_message(&[Pdu::Command(Command::new(1, 1, 1))]).unwrap();
        wire[7] = 9;
        assert!(matches!(
            decode_message(&wire, 0),
            Err(FrameError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn keepalive_count_must_be_one() {
        let mut wire = BytesMut::new();
        wire.put_u8(SYNC);
        wire.put_u16(PROTOCOL_VERSION);
        wire.put_u32(13);
        wire.put_u8(MessageType::KeepAlive.code());
        wire.put_u16(2);
        wire.put_u16(1);
        wire.put_u16(1);
        assert!(matches!(
            decode_message(&wire, 0),
            Err(FrameError::KeepAliveCount(2))
        ));

        let two = [
            Pdu::KeepAlive(KeepAlive::from_secs(1)),
            Pdu::KeepAlive(KeepAlive::from_secs(2)),
        ];
        assert!(matches!(
            encode_message(&two),
            Err(FrameError::KeepAliveCount(2))
        ));
    }

    #[test]
    fn size_field_that_lies_is_fatal() {
        let mut wire = encode_message(&[Pdu::Command(Command::new(1, 1, 1))]).unwrap();
        wire[6] += 1;
        wire.push(0);
        assert!(matches!(
            decode_message(&wire, 0),
            Err(FrameError::CursorMismatch {
                expected: 28,
                actual: 27
            })
        ));
    }

    #[test]
    fn size_smaller_than_header_is_fatal() {
        let mut wire = encode_message(&[Pdu::Command(Command::new(1, 1, 1))]).unwrap();
        wire[3..7].copy_from_slice(&4u32.to_be_bytes());
        assert!(matches!(
            decode_message(&wire, 0),
            Err(FrameError::CursorMismatch { .. })
        ));
    }

    #[test]
    fn oversize_frame_rejected_before_buffering() {
        let mut wire = BytesMut::new();
        wire.put_u8(SYNC);
        wire.put_u16(PROTOCOL_VERSION);
        wire.put_u32(1024);
        wire.put_u8(MessageType::Command.code());
        wire.put_u16(1);

        let config = FrameConfig { max_frame_size: 64 };
        assert!(matches!(
            decode_message_with_config(&wire, 0, &config),
            Err(FrameError::FrameTooLarge { size: 1024, max: 64 })
        ));
        assert!(decode_message(&wire, 0).unwrap().is_none());
    }

    #[test]
    fn mixed_types_rejected_before_writing() {
        let mut buf = BytesMut::from(&b"keep"[..]);
        let mixed = [
            Pdu::Command(Command::new(1, 1, 1)),
            Pdu::Response(Response::new(1, 0)),
        ];
        assert!(matches!(
            encode_message_into(&mixed, &mut buf),
            Err(FrameError::MixedMessageTypes {
                first: MessageType::Command,
                other: MessageType::Response
            })
        ));
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn empty_message_rejected() {
        assert!(matches!(encode_message(&[]), Err(FrameError::EmptyMessage)));
    }

    #[test]
    fn unassigned_handle_rejected() {
        assert!(matches!(
            encode_message(&[Pdu::CommandRrq(Command::new(1, 1, 1))]),
            Err(FrameError::UnassignedHandle)
        ));
    }

    #[test]
    fn notifications_share_a_frame() {
        let pdus: Vec<Pdu> = (0..3u16)
            .map(|n| {
                Notification::new(10, 4, 1, Event::new(10, EventId::new(1, n)))
                    .with_context(vec![n as u8; usize::from(n)])
                    .into()
            })
            .collect();
        let wire = encode_message(&pdus).unwrap();
        let (decoded, _) = decode_message(&wire, 0).unwrap().unwrap();
        assert_eq!(decoded.len(), 3);
        let Pdu::Notification(last) = &decoded[2] else {
            panic!("expected notification");
        };
        assert_eq!(last.context.as_deref(), Some(&[2u8, 2][..]));
        assert_eq!(last.event.event_id.event_index, 2);
        // An empty context decodes as absent.
        let Pdu::Notification(first) = &decoded[0] else {
            panic!("expected notification");
        };
        assert_eq!(first.context, None);
    }
}
