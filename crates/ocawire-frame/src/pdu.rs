//! PDU variants and their binary layouts.
//!
//! Every PDU except KeepAlive starts with a 32-bit length that counts the
//! whole PDU including the length field itself. KeepAlive has no length
//! prefix; its width is implied by the bytes left in the frame.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ocawire_types::cursor::{ReadCursor, WriteCursor};
use ocawire_types::{
    Compound, CustomType, CustomValue, Decoded, Encoder, Field, TypeError, TypeSignature,
    TypeTag, Value,
};

use crate::error::{FrameError, Result};

/// Message type discriminant shared by the frame header and every PDU in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Command = 0,
    CommandRrq = 1,
    Notification = 2,
    Response = 3,
    KeepAlive = 4,
}

impl MessageType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            MessageType::Command => "Command",
            MessageType::CommandRrq => "CommandRrq",
            MessageType::Notification => "Notification",
            MessageType::Response => "Response",
            MessageType::KeepAlive => "KeepAlive",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MessageType::Command),
            1 => Ok(MessageType::CommandRrq),
            2 => Ok(MessageType::Notification),
            3 => Ok(MessageType::Response),
            4 => Ok(MessageType::KeepAlive),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

/// Parameter payload of a Command, Response or Notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    /// Opaque bytes, copied verbatim. Decoded PDUs always carry this form.
    Raw(Bytes),
    /// Values rendered through a type signature at encode time.
    Encoded(Encoder),
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Raw(Bytes::new())
    }
}

impl From<Bytes> for Parameters {
    fn from(bytes: Bytes) -> Self {
        Parameters::Raw(bytes)
    }
}

impl From<Vec<u8>> for Parameters {
    fn from(bytes: Vec<u8>) -> Self {
        Parameters::Raw(Bytes::from(bytes))
    }
}

impl From<Encoder> for Parameters {
    fn from(encoder: Encoder) -> Self {
        Parameters::Encoded(encoder)
    }
}

impl Parameters {
    pub fn byte_length(&self) -> usize {
        match self {
            Parameters::Raw(bytes) => bytes.len(),
            Parameters::Encoded(encoder) => encoder.byte_length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.byte_length() == 0
    }

    /// The payload as bytes, rendering an encoder if needed.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Parameters::Raw(bytes) => Ok(bytes.clone()),
            Parameters::Encoded(encoder) => Ok(Bytes::from(encoder.to_bytes()?)),
        }
    }

    /// Interpret the payload through `signature`.
    pub fn decode_with(&self, signature: &TypeSignature) -> Result<Decoded> {
        Ok(signature.decode(&self.to_bytes()?)?)
    }

    fn write(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        match self {
            Parameters::Raw(bytes) => {
                let mut cur = WriteCursor::at(dst, pos);
                cur.put_slice(bytes)?;
                Ok(cur.position())
            }
            Parameters::Encoded(encoder) => Ok(encoder.encode_to(dst, pos)?),
        }
    }
}

/// Event identifier: definition level plus index within that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventId {
    pub def_level: u16,
    pub event_index: u16,
}

impl EventId {
    pub const fn new(def_level: u16, event_index: u16) -> Self {
        Self {
            def_level,
            event_index,
        }
    }
}

impl Compound for EventId {
    const TYPE_NAME: &'static str = "EventId";

    fn signature() -> ocawire_types::Result<TypeSignature> {
        TypeSignature::new([TypeTag::Uint16, TypeTag::Uint16])
    }

    fn from_values(values: Vec<Value>) -> ocawire_types::Result<Self> {
        match values.as_slice() {
            [Value::U16(def_level), Value::U16(event_index)] => {
                Ok(Self::new(*def_level, *event_index))
            }
            _ => Err(construct_error(Self::TYPE_NAME)),
        }
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::U16(self.def_level), Value::U16(self.event_index)]
    }
}

/// An event raised by an object: emitter object number plus event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Event {
    pub emitter_ono: u32,
    pub event_id: EventId,
}

impl Event {
    pub const fn new(emitter_ono: u32, event_id: EventId) -> Self {
        Self {
            emitter_ono,
            event_id,
        }
    }
}

impl Compound for Event {
    const TYPE_NAME: &'static str = "Event";

    fn signature() -> ocawire_types::Result<TypeSignature> {
        let event_id = Arc::new(CustomType::compound::<EventId>()?);
        TypeSignature::new([Field::Tag(TypeTag::Uint32), Field::Custom(event_id)])
    }

    fn from_values(values: Vec<Value>) -> ocawire_types::Result<Self> {
        let mut values = values.into_iter();
        match (values.next(), values.next(), values.next()) {
            (Some(Value::U32(emitter_ono)), Some(Value::Custom(event_id)), None) => {
                Ok(Self::new(emitter_ono, event_id.into_compound()?))
            }
            _ => Err(construct_error(Self::TYPE_NAME)),
        }
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::U32(self.emitter_ono),
            Value::Custom(CustomValue::from_compound(&self.event_id)),
        ]
    }
}

fn construct_error(type_name: &str) -> TypeError {
    TypeError::Construct {
        type_name: type_name.to_string(),
        reason: "unexpected field layout".to_string(),
    }
}

/// Command, with or without a required response.
///
/// The same record backs [`Pdu::Command`] and [`Pdu::CommandRrq`]; only the
/// latter may (and must) carry a non-zero handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub handle: u32,
    pub target: u32,
    pub method_level: u16,
    pub method_index: u16,
    pub param_count: u8,
    pub parameters: Parameters,
}

impl Command {
    /// Length + handle + target + level + index + parameter count.
    pub const HEADER_LEN: usize = 17;

    pub fn new(target: u32, method_level: u16, method_index: u16) -> Self {
        Self {
            target,
            method_level,
            method_index,
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, param_count: u8, parameters: impl Into<Parameters>) -> Self {
        self.param_count = param_count;
        self.parameters = parameters.into();
        self
    }

    /// Build the Response correlated with this command.
    pub fn response(
        &self,
        status_code: u8,
        param_count: u8,
        parameters: impl Into<Parameters>,
    ) -> Response {
        Response {
            handle: self.handle,
            status_code,
            param_count,
            parameters: parameters.into(),
        }
    }

    fn payload_len(&self) -> usize {
        if self.param_count > 0 {
            self.parameters.byte_length()
        } else {
            0
        }
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LEN + self.payload_len()
    }

    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        let length = pdu_length("Command", self.encoded_length())?;
        let mut cur = WriteCursor::at(dst, pos);
        cur.put_u32(length)?;
        cur.put_u32(self.handle)?;
        cur.put_u32(self.target)?;
        cur.put_u16(self.method_level)?;
        cur.put_u16(self.method_index)?;
        cur.put_u8(self.param_count)?;
        let pos = cur.position();
        if self.param_count > 0 {
            self.parameters.write(dst, pos)
        } else {
            Ok(pos)
        }
    }

    pub fn decode_from(buf: &[u8], pos: usize, remaining: usize) -> Result<(Self, usize)> {
        fits("Command", pos, Self::HEADER_LEN, remaining)?;
        let mut cur = ReadCursor::at(buf, pos);
        let length = cur.read_u32()?;
        let handle = cur.read_u32()?;
        let target = cur.read_u32()?;
        let method_level = cur.read_u16()?;
        let method_index = cur.read_u16()?;
        let param_count = cur.read_u8()?;

        let param_len = payload_length("Command", length, Self::HEADER_LEN)?;
        fits("Command", pos, Self::HEADER_LEN + param_len, remaining)?;
        if param_len > 0 && param_count == 0 {
            tracing::warn!(
                bytes = param_len,
                "decoding Command with parameter count 0 but trailing parameter bytes"
            );
        }
        let parameters = Parameters::Raw(Bytes::copy_from_slice(cur.read_bytes(param_len)?));

        let command = Self {
            handle,
            target,
            method_level,
            method_index,
            param_count,
            parameters,
        };
        Ok((command, cur.position()))
    }
}

/// Response to a Command-with-response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub handle: u32,
    pub status_code: u8,
    pub param_count: u8,
    pub parameters: Parameters,
}

impl Response {
    /// Length + handle + status + parameter count.
    pub const HEADER_LEN: usize = 10;

    pub fn new(handle: u32, status_code: u8) -> Self {
        Self {
            handle,
            status_code,
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, param_count: u8, parameters: impl Into<Parameters>) -> Self {
        self.param_count = param_count;
        self.parameters = parameters.into();
        self
    }

    fn payload_len(&self) -> usize {
        if self.param_count > 0 {
            self.parameters.byte_length()
        } else {
            0
        }
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LEN + self.payload_len()
    }

    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        let length = pdu_length("Response", self.encoded_length())?;
        let mut cur = WriteCursor::at(dst, pos);
        cur.put_u32(length)?;
        cur.put_u32(self.handle)?;
        cur.put_u8(self.status_code)?;
        cur.put_u8(self.param_count)?;
        let pos = cur.position();
        if self.param_count > 0 {
            self.parameters.write(dst, pos)
        } else {
            Ok(pos)
        }
    }

    pub fn decode_from(buf: &[u8], pos: usize, remaining: usize) -> Result<(Self, usize)> {
        fits("Response", pos, Self::HEADER_LEN, remaining)?;
        let mut cur = ReadCursor::at(buf, pos);
        let length = cur.read_u32()?;
        let handle = cur.read_u32()?;
        let status_code = cur.read_u8()?;
        let param_count = cur.read_u8()?;

        let param_len = payload_length("Response", length, Self::HEADER_LEN)?;
        fits("Response", pos, Self::HEADER_LEN + param_len, remaining)?;
        if param_len > 0 && param_count == 0 {
            tracing::warn!(
                bytes = param_len,
                "decoding Response with parameter count 0 but trailing parameter bytes"
            );
        }
        let parameters = Parameters::Raw(Bytes::copy_from_slice(cur.read_bytes(param_len)?));

        let response = Self {
            handle,
            status_code,
            param_count,
            parameters,
        };
        Ok((response, cur.position()))
    }
}

/// Notification of an event, optionally tagged with a context blob.
///
/// The event occupies parameter slot 0, so a payload is only written when
/// `param_count > 1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Notification {
    pub target: u32,
    pub method_level: u16,
    pub method_index: u16,
    pub param_count: u8,
    /// Out-of-band correlation data; empty and absent encode the same way.
    pub context: Option<Bytes>,
    pub event: Event,
    pub parameters: Parameters,
}

impl Notification {
    /// Fixed bytes when the context is empty.
    pub const HEADER_LEN: usize = 23;
    const PREFIX_LEN: usize = 15;

    pub fn new(target: u32, method_level: u16, method_index: u16, event: Event) -> Self {
        Self {
            target,
            method_level,
            method_index,
            param_count: 1,
            event,
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<Bytes>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_parameters(mut self, param_count: u8, parameters: impl Into<Parameters>) -> Self {
        self.param_count = param_count;
        self.parameters = parameters.into();
        self
    }

    fn context_len(&self) -> usize {
        self.context.as_ref().map_or(0, Bytes::len)
    }

    fn payload_len(&self) -> usize {
        if self.param_count > 1 {
            self.parameters.byte_length()
        } else {
            0
        }
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LEN + self.context_len() + self.payload_len()
    }

    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        let length = pdu_length("Notification", self.encoded_length())?;
        let context = self.context.as_deref().unwrap_or_default();
        let context_len = u16::try_from(context.len()).map_err(|_| FrameError::TooLarge {
            what: "notification context",
            size: context.len(),
            max: usize::from(u16::MAX),
        })?;

        let mut cur = WriteCursor::at(dst, pos);
        cur.put_u32(length)?;
        cur.put_u32(self.target)?;
        cur.put_u16(self.method_level)?;
        cur.put_u16(self.method_index)?;
        cur.put_u8(self.param_count)?;
        cur.put_u16(context_len)?;
        cur.put_slice(context)?;
        cur.put_u32(self.event.emitter_ono)?;
        cur.put_u16(self.event.event_id.def_level)?;
        cur.put_u16(self.event.event_id.event_index)?;
        let pos = cur.position();
        if self.param_count > 1 {
            self.parameters.write(dst, pos)
        } else {
            Ok(pos)
        }
    }

    pub fn decode_from(buf: &[u8], pos: usize, remaining: usize) -> Result<(Self, usize)> {
        fits("Notification", pos, Self::PREFIX_LEN, remaining)?;
        let mut cur = ReadCursor::at(buf, pos);
        let length = cur.read_u32()?;
        let target = cur.read_u32()?;
        let method_level = cur.read_u16()?;
        let method_index = cur.read_u16()?;
        let param_count = cur.read_u8()?;
        let context_len = usize::from(cur.read_u16()?);

        let header = Self::HEADER_LEN + context_len;
        fits("Notification", pos, header, remaining)?;
        let context = match context_len {
            0 => None,
            len => Some(Bytes::copy_from_slice(cur.read_bytes(len)?)),
        };
        let emitter_ono = cur.read_u32()?;
        let def_level = cur.read_u16()?;
        let event_index = cur.read_u16()?;

        let param_len = payload_length("Notification", length, header)?;
        fits("Notification", pos, header + param_len, remaining)?;
        if param_len > 0 && param_count <= 1 {
            tracing::warn!(
                param_count,
                bytes = param_len,
                "decoding Notification with parameter count <= 1 but trailing parameter bytes"
            );
        }
        let parameters = Parameters::Raw(Bytes::copy_from_slice(cur.read_bytes(param_len)?));

        let notification = Self {
            target,
            method_level,
            method_index,
            param_count,
            context,
            event: Event::new(emitter_ono, EventId::new(def_level, event_index)),
            parameters,
        };
        Ok((notification, cur.position()))
    }
}

/// Keep-alive carrying the heartbeat interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeepAlive {
    pub interval_ms: u32,
}

impl KeepAlive {
    pub const fn from_millis(interval_ms: u32) -> Self {
        Self { interval_ms }
    }

    pub const fn from_secs(secs: u16) -> Self {
        Self {
            interval_ms: secs as u32 * 1000,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.interval_ms))
    }

    /// Whole seconds when the interval fits the short 16-bit form.
    fn short_form(&self) -> Option<u16> {
        if self.interval_ms % 1000 != 0 {
            return None;
        }
        u16::try_from(self.interval_ms / 1000).ok()
    }

    pub fn encoded_length(&self) -> usize {
        if self.short_form().is_some() {
            2
        } else {
            4
        }
    }

    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        let mut cur = WriteCursor::at(dst, pos);
        match self.short_form() {
            Some(secs) => cur.put_u16(secs)?,
            None => cur.put_u32(self.interval_ms)?,
        }
        Ok(cur.position())
    }

    /// Decode from the bytes left in the frame: 4 means milliseconds, 2 means seconds.
    pub fn decode_from(buf: &[u8], pos: usize, remaining: usize) -> Result<(Self, usize)> {
        let mut cur = ReadCursor::at(buf, pos);
        let keepalive = match remaining {
            4 => Self::from_millis(cur.read_u32()?),
            2 => Self::from_secs(cur.read_u16()?),
            other => return Err(FrameError::KeepAliveLength(other)),
        };
        Ok((keepalive, cur.position()))
    }
}

impl TryFrom<Duration> for KeepAlive {
    type Error = FrameError;

    fn try_from(interval: Duration) -> Result<Self> {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        u32::try_from(millis)
            .map(Self::from_millis)
            .map_err(|_| FrameError::KeepAliveRange(millis))
    }
}

/// One protocol data unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    Command(Command),
    CommandRrq(Command),
    Notification(Notification),
    Response(Response),
    KeepAlive(KeepAlive),
}

impl From<Notification> for Pdu {
    fn from(pdu: Notification) -> Self {
        Pdu::Notification(pdu)
    }
}

impl From<Response> for Pdu {
    fn from(pdu: Response) -> Self {
        Pdu::Response(pdu)
    }
}

impl From<KeepAlive> for Pdu {
    fn from(pdu: KeepAlive) -> Self {
        Pdu::KeepAlive(pdu)
    }
}

impl Pdu {
    pub fn message_type(&self) -> MessageType {
        match self {
            Pdu::Command(_) => MessageType::Command,
            Pdu::CommandRrq(_) => MessageType::CommandRrq,
            Pdu::Notification(_) => MessageType::Notification,
            Pdu::Response(_) => MessageType::Response,
            Pdu::KeepAlive(_) => MessageType::KeepAlive,
        }
    }

    pub fn encoded_length(&self) -> usize {
        match self {
            Pdu::Command(pdu) | Pdu::CommandRrq(pdu) => pdu.encoded_length(),
            Pdu::Notification(pdu) => pdu.encoded_length(),
            Pdu::Response(pdu) => pdu.encoded_length(),
            Pdu::KeepAlive(pdu) => pdu.encoded_length(),
        }
    }

    /// Check everything that would make [`encode_to`](Self::encode_to) fail
    /// for reasons other than an undersized destination.
    pub fn validate(&self) -> Result<()> {
        match self {
            Pdu::CommandRrq(pdu) if pdu.handle == 0 => Err(FrameError::UnassignedHandle),
            Pdu::Notification(pdu) if pdu.context_len() > usize::from(u16::MAX) => {
                Err(FrameError::TooLarge {
                    what: "notification context",
                    size: pdu.context_len(),
                    max: usize::from(u16::MAX),
                })
            }
            Pdu::KeepAlive(_) => Ok(()),
            other => pdu_length(other.message_type().name(), other.encoded_length()).map(drop),
        }
    }

    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        match self {
            Pdu::Command(pdu) => pdu.encode_to(dst, pos),
            Pdu::CommandRrq(pdu) if pdu.handle == 0 => Err(FrameError::UnassignedHandle),
            Pdu::CommandRrq(pdu) => pdu.encode_to(dst, pos),
            Pdu::Notification(pdu) => pdu.encode_to(dst, pos),
            Pdu::Response(pdu) => pdu.encode_to(dst, pos),
            Pdu::KeepAlive(pdu) => pdu.encode_to(dst, pos),
        }
    }

    /// Decode one PDU of `message_type` at `pos`, with `remaining` bytes left in the frame.
    pub fn decode_from(
        message_type: MessageType,
        buf: &[u8],
        pos: usize,
        remaining: usize,
    ) -> Result<(Self, usize)> {
        match message_type {
            MessageType::Command => {
                Command::decode_from(buf, pos, remaining).map(|(pdu, end)| (Pdu::Command(pdu), end))
            }
            MessageType::CommandRrq => Command::decode_from(buf, pos, remaining)
                .map(|(pdu, end)| (Pdu::CommandRrq(pdu), end)),
            MessageType::Notification => Notification::decode_from(buf, pos, remaining)
                .map(|(pdu, end)| (Pdu::Notification(pdu), end)),
            MessageType::Response => Response::decode_from(buf, pos, remaining)
                .map(|(pdu, end)| (Pdu::Response(pdu), end)),
            MessageType::KeepAlive => KeepAlive::decode_from(buf, pos, remaining)
                .map(|(pdu, end)| (Pdu::KeepAlive(pdu), end)),
        }
    }
}

/// Hands out non-zero command handles.
///
/// Handle 0 marks commands that expect no response, so the counter skips it
/// when it wraps.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU32,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn next_handle(&self) -> u32 {
        loop {
            let handle = self.next.fetch_add(1, Ordering::Relaxed);
            if handle != 0 {
                return handle;
            }
        }
    }

    /// Assign a fresh handle and wrap the command as a Command-with-response.
    pub fn request(&self, mut command: Command) -> Pdu {
        command.handle = self.next_handle();
        Pdu::CommandRrq(command)
    }
}

fn fits(pdu: &'static str, offset: usize, needed: usize, available: usize) -> Result<()> {
    if needed > available {
        return Err(FrameError::PduOverrun {
            pdu,
            offset,
            needed,
            available,
        });
    }
    Ok(())
}

fn payload_length(pdu: &'static str, length: u32, header: usize) -> Result<usize> {
    usize::try_from(length)
        .ok()
        .and_then(|len| len.checked_sub(header))
        .ok_or(FrameError::PduLength {
            pdu,
            length,
            minimum: header,
        })
}

fn pdu_length(pdu: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FrameError::TooLarge {
        what: pdu,
        size: len,
        max: u32::MAX as usize,
    })
}
