use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_message_into, FrameConfig};
use crate::error::{FrameError, Result};
use crate::pdu::Pdu;

/// Encodes messages onto a blocking byte stream.
///
/// Every call encodes into an internal buffer first, so a PDU that fails to
/// encode leaves the stream untouched.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    /// Write `pdus` as one frame and flush.
    pub fn write_message(&mut self, pdus: &[Pdu]) -> Result<()> {
        self.write_batch(std::iter::once(pdus))
    }

    /// Write a lone PDU as its own frame.
    pub fn write_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        self.write_message(std::slice::from_ref(pdu))
    }

    /// Write several frames back to back with a single flush.
    ///
    /// All frames are encoded before the first byte is written.
    pub fn write_messages<'a, I>(&mut self, messages: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [Pdu]>,
    {
        self.write_batch(messages)
    }

    fn write_batch<'a, I>(&mut self, messages: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [Pdu]>,
    {
        self.buf.clear();
        for pdus in messages {
            let start = self.buf.len();
            encode_message_into(pdus, &mut self.buf)?;
            let size = self.buf.len() - start - 1;
            if size > self.config.max_frame_size {
                self.buf.clear();
                return Err(FrameError::FrameTooLarge {
                    size,
                    max: self.config.max_frame_size,
                });
            }
        }

        write_all_retrying(&mut self.inner, &self.buf)?;
        tracing::trace!(bytes = self.buf.len(), "wrote frames");
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if retryable(&err) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
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

fn retryable(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Like `Write::write_all`, but also retries `WouldBlock`, and reports a zero-length write as a closed peer.
fn write_all_retrying<W: Write>(out: &mut W, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match out.write(bytes) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if retryable(&err) => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_message;
    use crate::pdu::{Command, KeepAlive, Response};

    #[derive(Default)]
    struct Sink {
        data: Vec<u8>,
        flushes: usize,
        /// Errors popped from the back, one per call, before calls succeed.
        write_errors: Vec<ErrorKind>,
        flush_errors: Vec<ErrorKind>,
        max_write: Option<usize>,
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.write_errors.pop() {
                return Err(kind.into());
            }
            let n = self.max_write.map_or(buf.len(), |max| max.min(buf.len()));
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_errors.pop() {
                return Err(kind.into());
            }
            self.flushes += 1;
            Ok(())
        }
    }

    fn frames(wire: &[u8]) -> Vec<Vec<Pdu>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some((pdus, end)) = decode_message(wire, pos).unwrap() {
            out.push(pdus);
            pos = end;
        }
        assert_eq!(pos, wire.len());
        out
    }

    #[test]
    fn message_then_flush() {
        let mut writer = FrameWriter::new(Sink::default());
        let pdus = vec![Pdu::Command(Command::new(7, 1, 2))];
        writer.write_message(&pdus).unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.flushes, 1);
        assert_eq!(sink.data.len(), 27);
        assert_eq!(frames(&sink.data), vec![pdus]);
    }

    #[test]
    fn batch_shares_one_flush() {
        let first = vec![Pdu::KeepAlive(KeepAlive::from_secs(10))];
        let second = vec![Pdu::Response(Response::new(3, 0)), Pdu::Response(Response::new(4, 1))];
        let mut writer = FrameWriter::new(Sink::default());
        writer
            .write_messages([first.as_slice(), second.as_slice()])
            .unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.flushes, 1);
        assert_eq!(frames(&sink.data), vec![first, second]);
    }

    #[test]
    fn bad_frame_in_batch_writes_nothing() {
        let good = vec![Pdu::KeepAlive(KeepAlive::from_secs(1))];
        let bad = vec![Pdu::CommandRrq(Command::new(1, 1, 1))];
        let mut writer = FrameWriter::new(Sink::default());
        let err = writer
            .write_messages([good.as_slice(), bad.as_slice()])
            .unwrap_err();
        assert!(matches!(err, FrameError::UnassignedHandle));
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn frame_limit_applies_before_writing() {
        let cfg = FrameConfig { max_frame_size: 8 };
        let mut writer = FrameWriter::with_config(Sink::default(), cfg);
        let err = writer
            .write_pdu(&Pdu::Command(Command::new(1, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 26, max: 8 }));
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn retries_transient_errors_and_short_writes() {
        let sink = Sink {
            write_errors: vec![ErrorKind::WouldBlock, ErrorKind::Interrupted],
            flush_errors: vec![ErrorKind::Interrupted],
            max_write: Some(3),
            ..Sink::default()
        };
        let mut writer = FrameWriter::new(sink);
        let pdus = vec![Pdu::Response(Response::new(5, 0))];
        writer.write_message(&pdus).unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.flushes, 1);
        assert_eq!(frames(&sink.data), vec![pdus]);
    }

    #[test]
    fn hard_error_propagates() {
        let sink = Sink {
            write_errors: vec![ErrorKind::BrokenPipe],
            ..Sink::default()
        };
        let mut writer = FrameWriter::new(sink);
        let err = writer
            .write_pdu(&Pdu::KeepAlive(KeepAlive::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn zero_length_write_means_closed() {
        let sink = Sink {
            max_write: Some(0),
            ..Sink::default()
        };
        let mut writer = FrameWriter::new(sink);
        let err = writer
            .write_pdu(&Pdu::KeepAlive(KeepAlive::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}
