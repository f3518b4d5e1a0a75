//! Runtime values produced by decoding and consumed by encoding.

use crate::custom::Compound;
use crate::error::Result;

/// Largest high word a 64-bit integer may carry and still decode to a native value.
pub const FOLD_LIMIT: u32 = 1 << 20;

/// A single decoded value (field, element or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// An unsigned 64-bit value whose high word exceeds [`FOLD_LIMIT`].
    U64Parts { hi: u32, lo: u32 },
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    /// A signed 64-bit value (two's complement words) beyond the fold range.
    I64Parts { hi: u32, lo: u32 },
    F32(f32),
    F64(f64),
    /// Blob, fixed blob or rest-of-buffer bytes (always an owned copy).
    Blob(Vec<u8>),
    /// String or UTF-16 blob16 text.
    String(String),
    BitString(Vec<bool>),
    /// Variable or fixed-length list.
    List(Vec<Value>),
    /// Rows of equal length.
    List2D(Vec<Vec<Value>>),
    /// Key/value pairs in wire order.
    Map(Vec<(Value, Value)>),
    Custom(CustomValue),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::U64Parts { .. } => "u64 parts",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::I64Parts { .. } => "i64 parts",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Blob(_) => "blob",
            Value::String(_) => "string",
            Value::BitString(_) => "bitstring",
            Value::List(_) => "list",
            Value::List2D(_) => "list2d",
            Value::Map(_) => "map",
            Value::Custom(_) => "custom",
        }
    }

    /// Fold a raw unsigned 64-bit value the way the decoder does.
    pub fn from_u64_folded(value: u64) -> Self {
        let hi = (value >> 32) as u32;
        if hi <= FOLD_LIMIT {
            Value::U64(value)
        } else {
            Value::U64Parts {
                hi,
                lo: value as u32,
            }
        }
    }

    /// Fold a raw signed 64-bit value the way the decoder does.
    pub fn from_i64_folded(value: i64) -> Self {
        if value.unsigned_abs() >> 32 <= u64::from(FOLD_LIMIT) {
            Value::I64(value)
        } else {
            let raw = value as u64;
            Value::I64Parts {
                hi: (raw >> 32) as u32,
                lo: raw as u32,
            }
        }
    }

    /// Any integer variant widened to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) => Some(v.into()),
            Value::U64Parts { hi, lo } => Some(combine(hi, lo).into()),
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::I64(v) => Some(v.into()),
            Value::I64Parts { hi, lo } => Some((combine(hi, lo) as i64).into()),
            _ => None,
        }
    }

    /// Unsigned integer value, combining split words when needed.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|v| u64::try_from(v).ok())
    }

    /// Signed integer value, combining split words when needed.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&[bool]> {
        match self {
            Value::BitString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomValue> {
        match self {
            Value::Custom(v) => Some(v),
            _ => None,
        }
    }
}

fn combine(hi: u32, lo: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Vec<u8> => Blob,
    String => String,
    Vec<bool> => BitString,
    Vec<Value> => List,
    CustomValue => Custom,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

/// A decoded custom type: its registered name plus its positional fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomValue {
    pub type_name: String,
    pub values: Vec<Value>,
}

impl CustomValue {
    pub fn new(type_name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            values,
        }
    }

    /// Wrap a typed compound value.
    pub fn from_compound<T: Compound>(value: &T) -> Self {
        Self::new(T::TYPE_NAME, value.to_values())
    }

    /// Convert back into the typed compound it was decoded as.
    pub fn into_compound<T: Compound>(self) -> Result<T> {
        if self.type_name != T::TYPE_NAME {
            return Err(crate::error::TypeError::CustomTypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: self.type_name,
            });
        }
        T::from_values(self.values)
    }
}

/// Positional values decoded from a multi-field signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Value at position `n`.
    pub fn item(&self, n: usize) -> Option<&Value> {
        self.0.get(n)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

impl IntoIterator for Arguments {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Result of [`TypeSignature::decode`](crate::TypeSignature::decode).
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The signature has exactly one field.
    Single(Value),
    /// The signature has zero or several fields.
    Arguments(Arguments),
}

impl Decoded {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Decoded::Single(value) => vec![value],
            Decoded::Arguments(args) => args.into_vec(),
        }
    }
}
