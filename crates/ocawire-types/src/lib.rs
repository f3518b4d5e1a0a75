//! Schema-less type codec for OCP.1 parameter payloads.
//!
//! A [`TypeSignature`] describes an ordered tuple of typed fields and knows how
//! to size, encode and decode values of that shape:
//! - primitives are fixed-width big-endian integers, floats and booleans
//! - blobs, strings and bit strings carry a 16-bit length prefix
//! - lists, 2-D lists, fixed lists and maps nest further signatures
//! - custom types decode through their own signature and a constructor
//!
//! Signatures are immutable and can be shared between threads.

pub mod cursor;
pub mod custom;
pub mod encoder;
pub mod error;
pub mod signature;
pub mod utf8;
pub mod value;

pub use custom::{Compound, Constructor, CustomType, CustomTypeRegistry};
pub use encoder::Encoder;
pub use error::{Result, TypeError};
pub use signature::{
    bitstring_fixed, blob_fixed, custom, list, list2d, list_fixed, map, Field, TypeSignature,
    TypeTag,
};
pub use value::{Arguments, CustomValue, Decoded, Value, FOLD_LIMIT};
