//! Bounds-checked big-endian cursors over byte slices.
//!
//! Every read and write checks the remaining length first and reports a
//! [`TypeError`] instead of panicking, so malformed input can never take the
//! codec down.

use bytes::{Buf, BufMut};

use crate::error::{Result, TypeError};

/// Reads big-endian values from a slice, starting at an arbitrary offset.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_be {
    ($name:ident, $ty:ty, $get:ident, $width:expr) => {
        #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
        pub fn $name(&mut self) -> Result<$ty> {
            self.ensure($width)?;
            let mut tail = self.tail();
            let value = tail.$get();
            self.pos += $width;
            Ok(value)
        }
    };
}

impl<'a> ReadCursor<'a> {
    /// Create a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Create a cursor positioned at `pos`.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current absolute offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Unread bytes, without advancing.
    pub fn tail(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or(&[])
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if available < needed {
            return Err(TypeError::Truncated {
                offset: self.pos,
                needed,
                available,
            });
        }
        Ok(())
    }

    read_be!(read_u8, u8, get_u8, 1);
    read_be!(read_u16, u16, get_u16, 2);
    read_be!(read_u32, u32, get_u32, 4);
    read_be!(read_u64, u64, get_u64, 8);
    read_be!(read_i8, i8, get_i8, 1);
    read_be!(read_i16, i16, get_i16, 2);
    read_be!(read_i32, i32, get_i32, 4);
    read_be!(read_i64, i64, get_i64, 8);
    read_be!(read_f32, f32, get_f32, 4);
    read_be!(read_f64, f64, get_f64, 8);

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    /// Borrow everything left and move to the end.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.tail();
        self.pos = self.pos.max(self.buf.len());
        rest
    }

    /// Advance without reading.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }
}

/// Writes big-endian values into a pre-sized slice at an arbitrary offset.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

macro_rules! write_be {
    ($name:ident, $ty:ty, $put:ident, $width:expr) => {
        #[doc = concat!("Write a big-endian `", stringify!($ty), "`.")]
        pub fn $name(&mut self, value: $ty) -> Result<()> {
            self.ensure($width)?;
            let mut tail = &mut self.buf[self.pos..];
            tail.$put(value);
            self.pos += $width;
            Ok(())
        }
    };
}

impl<'a> WriteCursor<'a> {
    /// Create a cursor at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Create a cursor positioned at `pos`.
    pub fn at(buf: &'a mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current absolute offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Space left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if available < needed {
            return Err(TypeError::BufferTooSmall {
                offset: self.pos,
                needed,
                available,
            });
        }
        Ok(())
    }

    write_be!(put_u8, u8, put_u8, 1);
    write_be!(put_u16, u16, put_u16, 2);
    write_be!(put_u32, u32, put_u32, 4);
    write_be!(put_u64, u64, put_u64, 8);
    write_be!(put_i8, i8, put_i8, 1);
    write_be!(put_i16, i16, put_i16, 2);
    write_be!(put_i32, i32, put_i32, 4);
    write_be!(put_i64, i64, put_i64, 8);
    write_be!(put_f32, f32, put_f32, 4);
    write_be!(put_f64, f64, put_f64, 8);

    /// Copy `src` verbatim.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.ensure(src.len())?;
        let end = self.pos + src.len();
        self.buf[self.pos..end].copy_from_slice(src);
        self.pos = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_at_offset() {
        let buf = [0xff, 0x12, 0x34, 0x00, 0x00, 0x00, 0x2a];
        let mut cur = ReadCursor::at(&buf, 1);
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
        assert_eq!(cur.read_u32().unwrap(), 42);
        assert_eq!(cur.position(), 7);
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn truncated_read_reports_offset() {
        let buf = [0x00, 0x01, 0x02];
        let mut cur = ReadCursor::at(&buf, 1);
        let err = cur.read_u32().unwrap_err();
        assert_eq!(
            err,
            TypeError::Truncated {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        // A failed read must not move the cursor.
        assert_eq!(cur.position(), 1);
    }

    #[test]
    fn read_rest_consumes_everything() {
        let buf = [1, 2, 3, 4];
        let mut cur = ReadCursor::at(&buf, 1);
        assert_eq!(cur.read_rest(), &[2, 3, 4]);
        assert_eq!(cur.remaining(), 0);
        assert!(cur.read_rest().is_empty());
    }

    #[test]
    fn cursor_past_end_is_empty() {
        let buf = [1, 2];
        let cur = ReadCursor::at(&buf, 5);
        assert_eq!(cur.remaining(), 0);
        assert!(cur.tail().is_empty());
    }

    #[test]
    fn writes_big_endian_at_offset() {
        let mut buf = [0u8; 8];
        let mut cur = WriteCursor::at(&mut buf, 2);
        cur.put_u16(0xbeef).unwrap();
        cur.put_i32(-2).unwrap();
        assert_eq!(cur.position(), 8);
        assert_eq!(buf, [0, 0, 0xbe, 0xef, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn undersized_destination_is_an_error() {
        let mut buf = [0u8; 3];
        let mut cur = WriteCursor::new(&mut buf);
        assert!(matches!(
            cur.put_u32(1),
            Err(TypeError::BufferTooSmall { needed: 4, .. })
        ));
        assert!(matches!(
            cur.put_slice(&[1, 2, 3, 4]),
            Err(TypeError::BufferTooSmall { .. })
        ));
        cur.put_slice(&[9, 8, 7]).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }
}
