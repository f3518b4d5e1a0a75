//! Deferred encoding: a signature bound to a concrete value tuple.

use std::sync::Arc;

use crate::cursor::WriteCursor;
use crate::error::{Result, TypeError};
use crate::signature::TypeSignature;
use crate::value::Value;

/// A value tuple ready to be written, with its byte length known up front.
///
/// PDU encoders ask for [`byte_length`](Self::byte_length) while sizing a frame
/// and call [`encode_to`](Self::encode_to) later, so the length is computed once
/// at construction and every type error surfaces there.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoder {
    signature: Arc<TypeSignature>,
    values: Vec<Value>,
    byte_length: usize,
}

impl Encoder {
    pub fn new(signature: Arc<TypeSignature>, values: Vec<Value>) -> Result<Self> {
        let byte_length = signature.encoded_length(&values)?;
        Ok(Self {
            signature,
            values,
            byte_length,
        })
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Number of values (and signature fields).
    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    pub fn signature(&self) -> &Arc<TypeSignature> {
        &self.signature
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Write the encoding into `dst` at `pos`; returns `pos + byte_length`.
    pub fn encode_to(&self, dst: &mut [u8], pos: usize) -> Result<usize> {
        let mut cur = WriteCursor::at(dst, pos);
        self.signature.write_values(&mut cur, &self.values)?;
        let end = cur.position();
        if end - pos != self.byte_length {
            return Err(TypeError::EncodedLengthMismatch {
                expected: self.byte_length,
                actual: end - pos,
            });
        }
        Ok(end)
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.byte_length];
        self.encode_to(&mut out, 0)?;
        Ok(out)
    }
}
