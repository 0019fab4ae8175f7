//! Server-side response encoder: head first, then the entity stream.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::ResponseHeadEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};

/// Two-phase encoder for outbound responses.
///
/// A `Header` item arms the entity encoder matching its [`PayloadSize`];
/// `Payload` items are refused until then and a second head is refused until
/// the current entity reaches `Eof`. Misordered items are a caller bug and
/// surface as errors rather than corrupt framing on the wire.
pub struct ResponseEncoder {
    head_encoder: ResponseHeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// True once the current message (if any) is fully serialized.
    pub fn is_message_complete(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { head_encoder: ResponseHeadEncoder, payload_encoder: None }
    }
}

// Pinned to `Bytes` chunks: a codec generic over the data type would make
// the framed writer a `Sink` for infinitely many item types, leaving plain
// `flush()` calls ambiguous.
impl Encoder<Message<(ResponseHead, PayloadSize)>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("response head sent while previous entity is incomplete");
                    return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
                }

                let payload_encoder = PayloadEncoder::from(payload_size);
                let result = self.head_encoder.encode((head, payload_size), dst);
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                result
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("entity item sent before response head");
                    return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{Response, StatusCode};

    fn head(status: StatusCode) -> ResponseHead {
        Response::builder().status(status).body(()).unwrap()
    }

    #[test]
    fn encodes_fixed_length_response() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Length(5))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
        assert!(encoder.is_message_complete());
    }

    #[test]
    fn empty_response_completes_at_head() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::NO_CONTENT), PayloadSize::Empty)), &mut dst).unwrap();
        assert!(encoder.is_message_complete());

        // next head is accepted right away
        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Empty)), &mut dst).unwrap();
    }

    #[test]
    fn payload_before_head_is_refused() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let result = encoder.encode(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"x"))), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn head_mid_entity_is_refused() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Length(5))), &mut dst).unwrap();
        let result = encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Empty)), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn chunked_response_with_trailers() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let mut trailers = http::HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"data"))), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Trailers(trailers)), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(wire.contains("4\r\ndata\r\n"));
        assert!(wire.contains("0\r\nx-checksum: abc\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
        assert!(encoder.is_message_complete());
    }
}
