use crate::signature::TypeTag;

/// Errors that can occur while building signatures or encoding/decoding values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    /// A raw tag code that does not name any known type.
    #[error("unknown type tag {0}")]
    UnknownTag(u8),

    /// A composite tag was given without its parameters.
    #[error("type tag {0:?} requires parameters")]
    MissingParameters(TypeTag),

    /// The input ended before the value was complete.
    #[error("truncated input: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The destination buffer is too small for the encoded value.
    #[error("destination too small: need {needed} bytes at offset {offset}, {available} available")]
    BufferTooSmall {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The number of values does not match the number of signature fields.
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A value of the wrong kind was supplied for a field.
    #[error("type mismatch for {tag:?}: got {found}")]
    TypeMismatch { tag: TypeTag, found: &'static str },

    /// A negative value was supplied for an unsigned field.
    #[error("negative value {value} for unsigned field {tag:?}")]
    NegativeUnsigned { tag: TypeTag, value: i64 },

    /// A value does not fit the width of its field.
    #[error("value {value} out of range for {tag:?}")]
    OutOfRange { tag: TypeTag, value: i128 },

    /// A fixed-size field received a runtime value of a different length.
    #[error("fixed length mismatch for {tag:?}: declared {expected}, got {actual}")]
    FixedLengthMismatch {
        tag: TypeTag,
        expected: usize,
        actual: usize,
    },

    /// Rows of a two-dimensional list have different lengths.
    #[error("ragged 2-D list: row {row} has {actual} elements, expected {expected}")]
    RaggedList {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A count does not fit into its 16-bit length prefix.
    #[error("{tag:?} length {len} exceeds 16-bit prefix")]
    PrefixOverflow { tag: TypeTag, len: usize },

    /// A computed length overflowed `usize`.
    #[error("encoded length overflow")]
    LengthOverflow,

    /// Bytes written differ from the length computed up front.
    #[error("encoded {actual} bytes, expected {expected}")]
    EncodedLengthMismatch { expected: usize, actual: usize },

    /// A string field does not hold valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A custom value of the wrong type was supplied.
    #[error("custom type mismatch: expected {expected}, got {found}")]
    CustomTypeMismatch { expected: String, found: String },

    /// No custom type with this name is registered.
    #[error("unknown custom type {0}")]
    UnknownCustomType(String),

    /// A custom type constructor rejected the decoded tuple.
    #[error("cannot construct {type_name}: {reason}")]
    Construct { type_name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TypeError>;
