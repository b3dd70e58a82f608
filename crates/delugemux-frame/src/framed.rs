//! `tokio_util::codec` adapter for callers that drive a stream with `Framed`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{encode_request, FrameConfig, FrameInflater};
use crate::error::{FrameError, Result};
use crate::message::{Request, Response};

/// Client-side codec: encodes [`Request`]s, decodes [`Response`]s.
///
/// A partially received frame is inflated once; later reads continue where
/// the previous decode stopped.
#[derive(Debug, Default)]
pub struct EnvelopeCodec {
    config: FrameConfig,
    inflater: FrameInflater,
}

impl EnvelopeCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            inflater: FrameInflater::new(),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Response;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        match self.inflater.decode_response(&src[..], &self.config)? {
            Some((consumed, response)) => {
                src.advance(consumed);
                trace!(kind = response.kind(), bytes = consumed, "decoded frame");
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Request> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<()> {
        let frame = encode_request(&request)?;
        trace!(
            tag = request.tag,
            method = %request.method,
            bytes = frame.len(),
            "encoded frame"
        );
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::codec::Framed;

    use super::*;
    use crate::codec::{decode_request, encode_response};
    use crate::rencode::Value;

    #[tokio::test]
    async fn framed_round_trip_over_duplex() {
        let (client, mut daemon) = tokio::io::duplex(64);
        let mut framed = Framed::new(client, EnvelopeCodec::default());

        let request = Request::new(0, "daemon.info", vec![], BTreeMap::new()).unwrap();
        framed.send(request.clone()).await.unwrap();

        let mut wire = Vec::new();
        let config = FrameConfig::default();
        let received = loop {
            let mut chunk = [0u8; 16];
            let n = daemon.read(&mut chunk).await.unwrap();
            wire.extend_from_slice(&chunk[..n]);
            if let Some((_, decoded)) = decode_request(&wire, &config).unwrap() {
                break decoded;
            }
        };
        assert_eq!(received, request);

        let reply = encode_response(&Response::Result {
            tag: 0,
            value: Value::from("2.1.1"),
        })
        .unwrap();
        // Dribble the reply to exercise partial decode.
        for byte in reply.iter() {
            daemon.write_all(&[*byte]).await.unwrap();
        }

        let response = framed.next().await.unwrap().unwrap();
        assert_eq!(
            response,
            Response::Result {
                tag: 0,
                value: Value::from("2.1.1")
            }
        );
    }

    #[test]
    fn decoder_leaves_partial_frame_in_buffer() {
        let frame = encode_response(&Response::Result {
            tag: 3,
            value: Value::None,
        })
        .unwrap();
        let mut buf = BytesMut::from(&frame[..frame.len() - 1]);
        let mut codec = EnvelopeCodec::default();

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), frame.len() - 1);

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        buf.extend_from_slice(b"\x78");
        let response = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.tag(), Some(3));
        assert_eq!(&buf[..], b"\x78");
    }
}
