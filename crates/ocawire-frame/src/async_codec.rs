//! `tokio_util::codec` adapter for use with `Framed`, `FramedRead` and `FramedWrite`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message_with_config, encode_message_into, FrameConfig};
use crate::error::{FrameError, Result};
use crate::pdu::Pdu;

/// Decodes each frame into its PDUs and encodes PDU batches as frames.
#[derive(Debug, Clone, Default)]
pub struct OcaCodec {
    config: FrameConfig,
}

impl OcaCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn encode_frame(&self, pdus: &[Pdu], dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        encode_message_into(pdus, dst)?;
        let size = dst.len() - start - 1;
        if size > self.config.max_frame_size {
            dst.truncate(start);
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Decoder for OcaCodec {
    type Item = Vec<Pdu>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode_message_with_config(src, 0, &self.config)? {
            Some((pdus, end)) => {
                src.advance(end);
                Ok(Some(pdus))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Vec<Pdu>> for OcaCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Vec<Pdu>, dst: &mut BytesMut) -> Result<()> {
        self.encode_frame(&item, dst)
    }
}

impl Encoder<Pdu> for OcaCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Pdu, dst: &mut BytesMut) -> Result<()> {
        self.encode_frame(std::slice::from_ref(&item), dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::encode_message;
    use crate::pdu::{Command, KeepAlive, Response};

    #[test]
    fn decoder_waits_for_whole_frame() {
        let wire = encode_message(&[Pdu::Response(Response::new(1, 0))]).unwrap();
        let mut codec = OcaCodec::new();
        let mut buf = BytesMut::from(&wire[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&wire[5..]);
        let pdus = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pdus, vec![Pdu::Response(Response::new(1, 0))]);
        assert!(buf.is_empty());
    }

    #[test]
    fn encoder_respects_frame_limit() {
        let mut codec = OcaCodec::with_config(FrameConfig { max_frame_size: 4 });
        let mut dst = BytesMut::new();
        let err = codec
            .encode(vec![Pdu::Command(Command::new(1, 1, 1))], &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_roundtrip() {
        let messages = vec![
            vec![Pdu::KeepAlive(KeepAlive::from_secs(3))],
            vec![
                Pdu::Command(Command::new(1, 2, 3)),
                Pdu::Command(Command::new(4, 5, 6).with_parameters(1, vec![7])),
            ],
        ];

        let mut sink = FramedWrite::new(Vec::new(), OcaCodec::new());
        for pdus in &messages {
            sink.send(pdus.clone()).await.unwrap();
        }
        let wire = sink.into_inner();

        let mut stream = FramedRead::new(wire.as_slice(), OcaCodec::new());
        let mut seen = Vec::new();
        while let Some(pdus) = stream.next().await {
            seen.push(pdus.unwrap());
        }
        assert_eq!(seen, messages);
    }
}
