use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::codec::{decode_message_with_config, FrameConfig};
use crate::error::{FrameError, Result};
use crate::pdu::Pdu;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls whole messages off a blocking byte stream.
///
/// Framing errors are fatal, as with [`Connection`](crate::Connection): once
/// one is returned every later call fails with [`FrameError::StreamCorrupt`].
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    poisoned: bool,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
            poisoned: false,
        }
    }

    /// Next message, or `None` if the stream ended cleanly between frames.
    ///
    /// EOF inside a frame is [`FrameError::ConnectionClosed`].
    pub fn next_message(&mut self) -> Result<Option<Vec<Pdu>>> {
        if self.poisoned {
            return Err(FrameError::StreamCorrupt);
        }
        let result = self.fill_until_message();
        if matches!(&result, Err(err) if !matches!(err, FrameError::Io(_))) {
            self.poisoned = true;
        }
        result
    }

    /// Next message; a clean EOF is reported as [`FrameError::ConnectionClosed`] too.
    pub fn read_message(&mut self) -> Result<Vec<Pdu>> {
        self.next_message()?.ok_or(FrameError::ConnectionClosed)
    }

    fn fill_until_message(&mut self) -> Result<Option<Vec<Pdu>>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some((pdus, end)) = decode_message_with_config(&self.buf, 0, &self.config)? {
                self.buf.advance(end);
                return Ok(Some(pdus));
            }

            match self.inner.read(&mut chunk) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(0) => {
                    tracing::debug!(pending = self.buf.len(), "stream ended inside a frame");
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes of a partial frame held back for the next call.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Yields messages until clean EOF; stops after the first error.
impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Vec<Pdu>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        self.next_message().transpose()
    }
}
