//! Type signatures: ordered, recursive descriptions of a value tuple.
//!
//! A signature is a sequence of [`TypeTag`]s plus a side table holding the
//! parameters of composite tags (nested signatures, fixed lengths, custom
//! types). The side table is indexed by its own cursor that only advances on
//! composite tags, so primitive positions never consume a parameter slot.
//!
//! All multi-byte values are big-endian.

use std::sync::{Arc, OnceLock};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::custom::CustomType;
use crate::encoder::Encoder;
use crate::error::{Result, TypeError};
use crate::utf8::{buffer_to_utf8, codepoint_byte_length, codepoint_count};
use crate::value::{Arguments, CustomValue, Decoded, Value};

/// Wire type tags. Discriminants are the codes accepted by [`TypeSignature::from_codes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Boolean = 0,
    Uint8 = 1,
    Uint16 = 2,
    Uint32 = 3,
    Uint64 = 4,
    Int8 = 5,
    Int16 = 6,
    Int32 = 7,
    Int64 = 8,
    Float32 = 9,
    Float64 = 10,
    Blob = 11,
    Blob16 = 12,
    Rest = 13,
    BlobFixed = 14,
    String = 15,
    BitString = 16,
    BitStringFixed = 17,
    Map = 18,
    List = 19,
    List2D = 20,
    ListFixed = 21,
    Custom = 22,
}

impl TypeTag {
    /// Numeric wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether the tag needs an entry in the parameter side table.
    pub const fn is_composite(self) -> bool {
        matches!(
            self,
            TypeTag::BlobFixed
                | TypeTag::BitStringFixed
                | TypeTag::Map
                | TypeTag::List
                | TypeTag::List2D
                | TypeTag::ListFixed
                | TypeTag::Custom
        )
    }

    /// Encoded width of primitive fixed-size tags.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            TypeTag::Boolean | TypeTag::Uint8 | TypeTag::Int8 => Some(1),
            TypeTag::Uint16 | TypeTag::Int16 => Some(2),
            TypeTag::Uint32 | TypeTag::Int32 | TypeTag::Float32 => Some(4),
            TypeTag::Uint64 | TypeTag::Int64 | TypeTag::Float64 => Some(8),
            _ => None,
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = TypeError;

    fn try_from(code: u8) -> Result<Self> {
        let tag = match code {
            0 => TypeTag::Boolean,
            1 => TypeTag::Uint8,
            2 => TypeTag::Uint16,
            3 => TypeTag::Uint32,
            4 => TypeTag::Uint64,
            5 => TypeTag::Int8,
            6 => TypeTag::Int16,
            7 => TypeTag::Int32,
            8 => TypeTag::Int64,
            9 => TypeTag::Float32,
            10 => TypeTag::Float64,
            11 => TypeTag::Blob,
            12 => TypeTag::Blob16,
            13 => TypeTag::Rest,
            14 => TypeTag::BlobFixed,
            15 => TypeTag::String,
            16 => TypeTag::BitString,
            17 => TypeTag::BitStringFixed,
            18 => TypeTag::Map,
            19 => TypeTag::List,
            20 => TypeTag::List2D,
            21 => TypeTag::ListFixed,
            22 => TypeTag::Custom,
            other => return Err(TypeError::UnknownTag(other)),
        };
        Ok(tag)
    }
}

/// Description of one signature field, as passed to [`TypeSignature::new`].
#[derive(Debug, Clone)]
pub enum Field {
    /// A primitive tag. Composite tags are rejected here.
    Tag(TypeTag),
    BlobFixed(usize),
    BitStringFixed(usize),
    List(Box<Field>),
    List2D(Box<Field>),
    ListFixed(usize, Box<Field>),
    Map(Box<Field>, Box<Field>),
    Custom(Arc<CustomType>),
}

impl From<TypeTag> for Field {
    fn from(tag: TypeTag) -> Self {
        Field::Tag(tag)
    }
}

impl From<Arc<CustomType>> for Field {
    fn from(custom: Arc<CustomType>) -> Self {
        Field::Custom(custom)
    }
}

/// Variable-length list of `element`.
pub fn list(element: impl Into<Field>) -> Field {
    Field::List(Box::new(element.into()))
}

/// Two-dimensional list of `element`.
pub fn list2d(element: impl Into<Field>) -> Field {
    Field::List2D(Box::new(element.into()))
}

/// List of exactly `len` elements, without a count on the wire.
pub fn list_fixed(len: usize, element: impl Into<Field>) -> Field {
    Field::ListFixed(len, Box::new(element.into()))
}

/// Map from `key` to `value`.
pub fn map(key: impl Into<Field>, value: impl Into<Field>) -> Field {
    Field::Map(Box::new(key.into()), Box::new(value.into()))
}

/// Blob of exactly `len` bytes.
pub fn blob_fixed(len: usize) -> Field {
    Field::BlobFixed(len)
}

/// Bit string of exactly `len` bits.
pub fn bitstring_fixed(len: usize) -> Field {
    Field::BitStringFixed(len)
}

/// Field of a registered custom type.
pub fn custom(custom: Arc<CustomType>) -> Field {
    Field::Custom(custom)
}

/// Parameter of a composite tag.
#[derive(Debug, Clone, PartialEq)]
enum Param {
    /// Byte or bit count of a fixed blob / bit string.
    Length(usize),
    /// Element signature of a list, 2-D list, or the key/value signature of a map.
    Nested(Arc<TypeSignature>),
    /// Element count and element signature of a fixed list.
    Fixed(usize, Arc<TypeSignature>),
    Custom(Arc<CustomType>),
}

/// An immutable, reusable description of a value tuple.
#[derive(Debug, Clone)]
pub struct TypeSignature {
    tags: Vec<TypeTag>,
    params: Vec<Param>,
    fixed_length: OnceLock<Option<usize>>,
}

impl PartialEq for TypeSignature {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags && self.params == other.params
    }
}

impl TypeSignature {
    /// Build a signature from field descriptions.
    pub fn new<I>(fields: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Field>,
    {
        let mut tags = Vec::new();
        let mut params = Vec::new();

        for field in fields {
            let (tag, param) = match field.into() {
                Field::Tag(tag) if tag.is_composite() => {
                    return Err(TypeError::MissingParameters(tag))
                }
                Field::Tag(tag) => (tag, None),
                Field::BlobFixed(len) => (TypeTag::BlobFixed, Some(Param::Length(len))),
                Field::BitStringFixed(len) => {
                    (TypeTag::BitStringFixed, Some(Param::Length(len)))
                }
                Field::List(element) => (TypeTag::List, Some(Param::Nested(nested([*element])?))),
                Field::List2D(element) => {
                    (TypeTag::List2D, Some(Param::Nested(nested([*element])?)))
                }
                Field::ListFixed(len, element) => (
                    TypeTag::ListFixed,
                    Some(Param::Fixed(len, nested([*element])?)),
                ),
                Field::Map(key, value) => {
                    (TypeTag::Map, Some(Param::Nested(nested([*key, *value])?)))
                }
                Field::Custom(custom) => (TypeTag::Custom, Some(Param::Custom(custom))),
            };
            tags.push(tag);
            params.extend(param);
        }

        Ok(Self {
            tags,
            params,
            fixed_length: OnceLock::new(),
        })
    }

    /// Build a signature of primitive tags from raw codes.
    ///
    /// Every code is checked before the signature exists, so an unknown code
    /// is rejected before any encode or decode is attempted.
    pub fn from_codes(codes: &[u8]) -> Result<Self> {
        let tags = codes
            .iter()
            .map(|&code| TypeTag::try_from(code))
            .collect::<Result<Vec<_>>>()?;
        Self::new(tags)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[TypeTag] {
        &self.tags
    }

    /// Fields paired with their side-table parameters.
    fn fields(&self) -> impl Iterator<Item = (TypeTag, Option<&Param>)> + '_ {
        let mut params = self.params.iter();
        self.tags.iter().map(move |&tag| {
            let param = if tag.is_composite() {
                params.next()
            } else {
                None
            };
            (tag, param)
        })
    }

    /// Total encoded length when every field is fixed-width, else `None`.
    ///
    /// Computed on first use and cached; a failed computation is not cached.
    /// This sizes the signature only and says nothing about whether a given
    /// value tuple fits it; [`encoded_length`](Self::encoded_length) checks that.
    pub fn fixed_length(&self) -> Result<Option<usize>> {
        if let Some(cached) = self.fixed_length.get() {
            return Ok(*cached);
        }
        let computed = self.compute_fixed_length()?;
        let _ = self.fixed_length.set(computed);
        Ok(computed)
    }

    fn compute_fixed_length(&self) -> Result<Option<usize>> {
        let mut total = 0usize;
        for (tag, param) in self.fields() {
            let width = match tag.fixed_width() {
                Some(width) => width,
                None => match (tag, param) {
                    (TypeTag::BlobFixed, Some(Param::Length(len))) => *len,
                    (TypeTag::BitStringFixed, Some(Param::Length(len))) => bit_bytes(*len),
                    (TypeTag::ListFixed, Some(Param::Fixed(count, element))) => {
                        match element.fixed_length()? {
                            Some(width) => count.checked_mul(width).ok_or(TypeError::LengthOverflow)?,
                            None => return Ok(None),
                        }
                    }
                    (TypeTag::Custom, Some(Param::Custom(custom))) => {
                        match custom.signature().fixed_length()? {
                            Some(width) => width,
                            None => return Ok(None),
                        }
                    }
                    (tag, None) if tag.is_composite() => {
                        return Err(TypeError::MissingParameters(tag))
                    }
                    _ => return Ok(None),
                },
            };
            total = total.checked_add(width).ok_or(TypeError::LengthOverflow)?;
        }
        tracing::trace!(fields = self.tags.len(), length = total, "fixed signature length");
        Ok(Some(total))
    }

    /// Exact encoded size of `values`.
    ///
    /// Every value is checked against its field, including fixed-width ones, so
    /// anything `encode` would reject fails here first.
    pub fn encoded_length(&self, values: &[Value]) -> Result<usize> {
        self.low_encoded_length(values.iter())
    }

    /// Exact encoded size of a borrowed value sequence.
    pub fn low_encoded_length<'v, I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'v Value>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        self.check_arity(values.len())?;
        let mut total = 0usize;
        for ((tag, param), value) in self.fields().zip(values) {
            let len = field_length(tag, param, value)?;
            total = total.checked_add(len).ok_or(TypeError::LengthOverflow)?;
        }
        Ok(total)
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        if actual != self.tags.len() {
            return Err(TypeError::ArityMismatch {
                expected: self.tags.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Decode from the start of `buf`.
    ///
    /// A single-field signature yields its value directly; any other arity
    /// yields positional [`Arguments`].
    pub fn decode(&self, buf: &[u8]) -> Result<Decoded> {
        let mut values = self.low_decode(buf)?;
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return Ok(Decoded::Single(value));
            }
        }
        Ok(Decoded::Arguments(Arguments::new(values)))
    }

    /// Decode from the start of `buf` into a positional vector.
    pub fn low_decode(&self, buf: &[u8]) -> Result<Vec<Value>> {
        self.decode_at(buf, 0).map(|(values, _)| values)
    }

    /// Decode starting at `pos`, returning the values and the offset after them.
    pub fn decode_at(&self, buf: &[u8], pos: usize) -> Result<(Vec<Value>, usize)> {
        let mut cur = ReadCursor::at(buf, pos);
        let mut values = Vec::with_capacity(self.tags.len());
        self.read_into(&mut cur, &mut values)?;
        Ok((values, cur.position()))
    }

    /// Encode into a newly allocated buffer of exactly `encoded_length` bytes.
    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        let len = self.encoded_length(values)?;
        let mut out = vec![0u8; len];
        let end = self.encode_to(&mut out, 0, values)?;
        out.truncate(end);
        Ok(out)
    }

    /// Encode into `dst` at `pos`, returning the offset after the last byte written.
    pub fn encode_to(&self, dst: &mut [u8], pos: usize, values: &[Value]) -> Result<usize> {
        let mut cur = WriteCursor::at(dst, pos);
        self.write_values(&mut cur, values.iter())?;
        Ok(cur.position())
    }

    /// Bind `values` to this signature for deferred encoding.
    pub fn encoder(self: &Arc<Self>, values: Vec<Value>) -> Result<Encoder> {
        Encoder::new(Arc::clone(self), values)
    }

    pub(crate) fn read_into(&self, cur: &mut ReadCursor<'_>, out: &mut Vec<Value>) -> Result<()> {
        for (tag, param) in self.fields() {
            out.push(read_field(cur, tag, param)?);
        }
        Ok(())
    }

    fn read_element(&self, cur: &mut ReadCursor<'_>) -> Result<Value> {
        let mut values = Vec::with_capacity(1);
        self.read_into(cur, &mut values)?;
        match (values.pop(), values.is_empty()) {
            (Some(value), true) => Ok(value),
            _ => Err(TypeError::ArityMismatch {
                expected: 1,
                actual: self.tags.len(),
            }),
        }
    }

    pub(crate) fn write_values<'v, I>(&self, cur: &mut WriteCursor<'_>, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'v Value>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        self.check_arity(values.len())?;
        for ((tag, param), value) in self.fields().zip(values) {
            write_field(cur, tag, param, value)?;
        }
        Ok(())
    }

    /// Length of a run of elements, each checked against this signature.
    fn elements_length<'v, I>(&self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        elements.into_iter().try_fold(0usize, |total, element| {
            let len = self.low_encoded_length(std::iter::once(element))?;
            total.checked_add(len).ok_or(TypeError::LengthOverflow)
        })
    }
}

fn nested<const N: usize>(fields: [Field; N]) -> Result<Arc<TypeSignature>> {
    TypeSignature::new(fields).map(Arc::new)
}

fn bit_bytes(bits: usize) -> usize {
    bits.div_ceil(8)
}

fn prefix(tag: TypeTag, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| TypeError::PrefixOverflow { tag, len })
}

fn mismatch(tag: TypeTag, value: &Value) -> TypeError {
    TypeError::TypeMismatch {
        tag,
        found: value.kind(),
    }
}

fn missing(tag: TypeTag) -> TypeError {
    TypeError::MissingParameters(tag)
}

fn unsigned(tag: TypeTag, value: &Value, max: u64) -> Result<u64> {
    let raw = value.as_integer().ok_or_else(|| mismatch(tag, value))?;
    if raw < 0 {
        return Err(TypeError::NegativeUnsigned {
            tag,
            value: i64::try_from(raw).unwrap_or(i64::MIN),
        });
    }
    if raw > i128::from(max) {
        return Err(TypeError::OutOfRange { tag, value: raw });
    }
    Ok(raw as u64)
}

fn signed(tag: TypeTag, value: &Value, min: i64, max: i64) -> Result<i64> {
    let raw = value.as_integer().ok_or_else(|| mismatch(tag, value))?;
    if raw < i128::from(min) || raw > i128::from(max) {
        return Err(TypeError::OutOfRange { tag, value: raw });
    }
    Ok(raw as i64)
}

fn float(tag: TypeTag, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(tag, value))
}

/// The same conversions `write_field` applies, with the result discarded.
fn check_scalar(tag: TypeTag, value: &Value) -> Result<()> {
    match tag {
        TypeTag::Boolean => value.as_bool().map(drop).ok_or_else(|| mismatch(tag, value)),
        TypeTag::Uint8 => unsigned(tag, value, u8::MAX.into()).map(drop),
        TypeTag::Uint16 => unsigned(tag, value, u16::MAX.into()).map(drop),
        TypeTag::Uint32 => unsigned(tag, value, u32::MAX.into()).map(drop),
        TypeTag::Uint64 => unsigned(tag, value, u64::MAX).map(drop),
        TypeTag::Int8 => signed(tag, value, i8::MIN.into(), i8::MAX.into()).map(drop),
        TypeTag::Int16 => signed(tag, value, i16::MIN.into(), i16::MAX.into()).map(drop),
        TypeTag::Int32 => signed(tag, value, i32::MIN.into(), i32::MAX.into()).map(drop),
        TypeTag::Int64 => signed(tag, value, i64::MIN, i64::MAX).map(drop),
        TypeTag::Float32 | TypeTag::Float64 => float(tag, value).map(drop),
        _ => Ok(()),
    }
}

fn check_fixed(tag: TypeTag, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(TypeError::FixedLengthMismatch {
            tag,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Width of a 2-D list and a check that every row matches it.
fn grid_width(rows: &[Vec<Value>]) -> Result<usize> {
    let width = rows.first().map_or(0, Vec::len);
    for (row, cells) in rows.iter().enumerate() {
        if cells.len() != width {
            return Err(TypeError::RaggedList {
                row,
                expected: width,
                actual: cells.len(),
            });
        }
    }
    Ok(width)
}

fn decode_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|k| bytes[k >> 3] & (0x80 >> (k & 7)) != 0)
        .collect()
}

fn encode_bits(cur: &mut WriteCursor<'_>, bits: &[bool]) -> Result<()> {
    for chunk in bits.chunks(8) {
        let byte = chunk
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .fold(0u8, |acc, (k, _)| acc | (0x80 >> k));
        cur.put_u8(byte)?;
    }
    Ok(())
}

fn field_length(tag: TypeTag, param: Option<&Param>, value: &Value) -> Result<usize> {
    if let Some(width) = tag.fixed_width() {
        check_scalar(tag, value)?;
        return Ok(width);
    }
    let len = match (tag, param) {
        (TypeTag::Blob, _) => 2 + value.as_bytes().ok_or_else(|| mismatch(tag, value))?.len(),
        (TypeTag::Rest, _) => value.as_bytes().ok_or_else(|| mismatch(tag, value))?.len(),
        (TypeTag::Blob16, _) => {
            let text = value.as_str().ok_or_else(|| mismatch(tag, value))?;
            2 + 2 * text.encode_utf16().count()
        }
        (TypeTag::String, _) => {
            let text = value.as_str().ok_or_else(|| mismatch(tag, value))?;
            2 + text.len()
        }
        (TypeTag::BitString, _) => {
            let bits = value.as_bits().ok_or_else(|| mismatch(tag, value))?;
            2 + bit_bytes(bits.len())
        }
        (TypeTag::BlobFixed, Some(Param::Length(len))) => *len,
        (TypeTag::BitStringFixed, Some(Param::Length(len))) => bit_bytes(*len),
        (TypeTag::List, Some(Param::Nested(element))) => {
            let items = value.as_list().ok_or_else(|| mismatch(tag, value))?;
            2 + element.elements_length(items)?
        }
        (TypeTag::ListFixed, Some(Param::Fixed(count, element))) => {
            let items = value.as_list().ok_or_else(|| mismatch(tag, value))?;
            check_fixed(tag, *count, items.len())?;
            element.elements_length(items)?
        }
        (TypeTag::List2D, Some(Param::Nested(element))) => {
            let Value::List2D(rows) = value else {
                return Err(mismatch(tag, value));
            };
            grid_width(rows)?;
            4 + element.elements_length(rows.iter().flatten())?
        }
        (TypeTag::Map, Some(Param::Nested(pair))) => {
            let pairs = value.as_map().ok_or_else(|| mismatch(tag, value))?;
            let body = pairs.iter().try_fold(0usize, |total, (k, v)| {
                let len = pair.low_encoded_length([k, v])?;
                total.checked_add(len).ok_or(TypeError::LengthOverflow)
            })?;
            2 + body
        }
        (TypeTag::Custom, Some(Param::Custom(custom))) => {
            let inner = expect_custom(custom, value)?;
            custom.signature().encoded_length(&inner.values)?
        }
        (tag, _) => return Err(missing(tag)),
    };
    Ok(len)
}

fn expect_custom<'v>(custom: &CustomType, value: &'v Value) -> Result<&'v CustomValue> {
    match value {
        Value::Custom(inner) if inner.type_name == custom.name() => Ok(inner),
        Value::Custom(inner) => Err(TypeError::CustomTypeMismatch {
            expected: custom.name().to_string(),
            found: inner.type_name.clone(),
        }),
        other => Err(TypeError::CustomTypeMismatch {
            expected: custom.name().to_string(),
            found: other.kind().to_string(),
        }),
    }
}

fn read_field(cur: &mut ReadCursor<'_>, tag: TypeTag, param: Option<&Param>) -> Result<Value> {
    let value = match (tag, param) {
        (TypeTag::Boolean, _) => Value::Bool(cur.read_u8()? != 0),
        (TypeTag::Uint8, _) => Value::U8(cur.read_u8()?),
        (TypeTag::Uint16, _) => Value::U16(cur.read_u16()?),
        (TypeTag::Uint32, _) => Value::U32(cur.read_u32()?),
        (TypeTag::Uint64, _) => Value::from_u64_folded(cur.read_u64()?),
        (TypeTag::Int8, _) => Value::I8(cur.read_i8()?),
        (TypeTag::Int16, _) => Value::I16(cur.read_i16()?),
        (TypeTag::Int32, _) => Value::I32(cur.read_i32()?),
        (TypeTag::Int64, _) => Value::from_i64_folded(cur.read_i64()?),
        (TypeTag::Float32, _) => Value::F32(cur.read_f32()?),
        (TypeTag::Float64, _) => Value::F64(cur.read_f64()?),
        (TypeTag::Blob, _) => {
            let len = usize::from(cur.read_u16()?);
            Value::Blob(cur.read_bytes(len)?.to_vec())
        }
        (TypeTag::Blob16, _) => {
            let len = usize::from(cur.read_u16()?);
            let units = (0..len)
                .map(|_| cur.read_u16())
                .collect::<Result<Vec<u16>>>()?;
            // Any code unit sequence is accepted; unpaired surrogates become U+FFFD.
            Value::String(String::from_utf16_lossy(&units))
        }
        (TypeTag::Rest, _) => Value::Blob(cur.read_rest().to_vec()),
        (TypeTag::String, _) => {
            let codepoints = usize::from(cur.read_u16()?);
            let tail = cur.tail();
            let len = codepoint_byte_length(tail, codepoints).ok_or(TypeError::Truncated {
                offset: cur.position(),
                needed: codepoints,
                available: tail.len(),
            })?;
            Value::String(buffer_to_utf8(cur.read_bytes(len)?)?)
        }
        (TypeTag::BitString, _) => {
            let count = usize::from(cur.read_u16()?);
            Value::BitString(decode_bits(cur.read_bytes(bit_bytes(count))?, count))
        }
        (TypeTag::BlobFixed, Some(Param::Length(len))) => Value::Blob(cur.read_bytes(*len)?.to_vec()),
        (TypeTag::BitStringFixed, Some(Param::Length(count))) => {
            Value::BitString(decode_bits(cur.read_bytes(bit_bytes(*count))?, *count))
        }
        (TypeTag::Map, Some(Param::Nested(pair))) => {
            let count = usize::from(cur.read_u16()?);
            let mut pairs = Vec::with_capacity(count);
            let mut scratch = Vec::with_capacity(2);
            for _ in 0..count {
                scratch.clear();
                pair.read_into(cur, &mut scratch)?;
                let mut kv = scratch.drain(..);
                match (kv.next(), kv.next()) {
                    (Some(k), Some(v)) => pairs.push((k, v)),
                    _ => {
                        return Err(TypeError::ArityMismatch {
                            expected: 2,
                            actual: pair.len(),
                        })
                    }
                }
            }
            Value::Map(pairs)
        }
        (TypeTag::List, Some(Param::Nested(element))) => {
            let count = usize::from(cur.read_u16()?);
            Value::List(read_elements(cur, element, count)?)
        }
        (TypeTag::ListFixed, Some(Param::Fixed(count, element))) => {
            Value::List(read_elements(cur, element, *count)?)
        }
        (TypeTag::List2D, Some(Param::Nested(element))) => {
            let width = usize::from(cur.read_u16()?);
            let height = usize::from(cur.read_u16()?);
            let rows = (0..height)
                .map(|_| read_elements(cur, element, width))
                .collect::<Result<Vec<_>>>()?;
            Value::List2D(rows)
        }
        (TypeTag::Custom, Some(Param::Custom(custom))) => {
            let mut values = Vec::with_capacity(custom.signature().len());
            custom.signature().read_into(cur, &mut values)?;
            custom.construct(&values)?;
            Value::Custom(CustomValue::new(custom.name(), values))
        }
        (tag, _) => return Err(missing(tag)),
    };
    Ok(value)
}

fn read_elements(cur: &mut ReadCursor<'_>, element: &TypeSignature, count: usize) -> Result<Vec<Value>> {
    // Cap the pre-allocation by what the input could possibly hold.
    let mut items = Vec::with_capacity(count.min(cur.remaining()));
    for _ in 0..count {
        items.push(element.read_element(cur)?);
    }
    Ok(items)
}

fn write_field(
    cur: &mut WriteCursor<'_>,
    tag: TypeTag,
    param: Option<&Param>,
    value: &Value,
) -> Result<()> {
    match (tag, param) {
        (TypeTag::Boolean, _) => {
            let flag = value.as_bool().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u8(u8::from(flag))
        }
        (TypeTag::Uint8, _) => cur.put_u8(unsigned(tag, value, u8::MAX.into())? as u8),
        (TypeTag::Uint16, _) => cur.put_u16(unsigned(tag, value, u16::MAX.into())? as u16),
        (TypeTag::Uint32, _) => cur.put_u32(unsigned(tag, value, u32::MAX.into())? as u32),
        (TypeTag::Uint64, _) => cur.put_u64(unsigned(tag, value, u64::MAX)?),
        (TypeTag::Int8, _) => cur.put_i8(signed(tag, value, i8::MIN.into(), i8::MAX.into())? as i8),
        (TypeTag::Int16, _) => {
            cur.put_i16(signed(tag, value, i16::MIN.into(), i16::MAX.into())? as i16)
        }
        (TypeTag::Int32, _) => {
            cur.put_i32(signed(tag, value, i32::MIN.into(), i32::MAX.into())? as i32)
        }
        (TypeTag::Int64, _) => cur.put_i64(signed(tag, value, i64::MIN, i64::MAX)?),
        (TypeTag::Float32, _) => cur.put_f32(float(tag, value)? as f32),
        (TypeTag::Float64, _) => cur.put_f64(float(tag, value)?),
        (TypeTag::Blob, _) => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, bytes.len())?)?;
            cur.put_slice(bytes)
        }
        (TypeTag::Blob16, _) => {
            let text = value.as_str().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, text.encode_utf16().count())?)?;
            text.encode_utf16().try_for_each(|unit| cur.put_u16(unit))
        }
        (TypeTag::Rest, _) => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(tag, value))?;
            cur.put_slice(bytes)
        }
        (TypeTag::String, _) => {
            let text = value.as_str().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, codepoint_count(text))?)?;
            cur.put_slice(text.as_bytes())
        }
        (TypeTag::BitString, _) => {
            let bits = value.as_bits().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, bits.len())?)?;
            encode_bits(cur, bits)
        }
        (TypeTag::BlobFixed, Some(Param::Length(len))) => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(tag, value))?;
            check_fixed(tag, *len, bytes.len())?;
            cur.put_slice(bytes)
        }
        (TypeTag::BitStringFixed, Some(Param::Length(len))) => {
            let bits = value.as_bits().ok_or_else(|| mismatch(tag, value))?;
            check_fixed(tag, *len, bits.len())?;
            encode_bits(cur, bits)
        }
        (TypeTag::Map, Some(Param::Nested(pair))) => {
            let pairs = value.as_map().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, pairs.len())?)?;
            pairs
                .iter()
                .try_for_each(|(k, v)| pair.write_values(cur, [k, v]))
        }
        (TypeTag::List, Some(Param::Nested(element))) => {
            let items = value.as_list().ok_or_else(|| mismatch(tag, value))?;
            cur.put_u16(prefix(tag, items.len())?)?;
            items
                .iter()
                .try_for_each(|item| element.write_values(cur, std::iter::once(item)))
        }
        (TypeTag::ListFixed, Some(Param::Fixed(count, element))) => {
            let items = value.as_list().ok_or_else(|| mismatch(tag, value))?;
            check_fixed(tag, *count, items.len())?;
            items
                .iter()
                .try_for_each(|item| element.write_values(cur, std::iter::once(item)))
        }
        (TypeTag::List2D, Some(Param::Nested(element))) => {
            let Value::List2D(rows) = value else {
                return Err(mismatch(tag, value));
            };
            let width = grid_width(rows)?;
            cur.put_u16(prefix(tag, width)?)?;
            cur.put_u16(prefix(tag, rows.len())?)?;
            rows.iter()
                .flatten()
                .try_for_each(|item| element.write_values(cur, std::iter::once(item)))
        }
        (TypeTag::Custom, Some(Param::Custom(custom))) => {
            let inner = expect_custom(custom, value)?;
            custom.signature().write_values(cur, &inner.values)
        }
        (tag, _) => Err(missing(tag)),
    }
}
