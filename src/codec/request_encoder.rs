//! Client-side request encoder: head first, then the entity stream.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::RequestHeadEncoder;
use crate::protocol::{Message, PayloadSize, RequestHead, SendError};

/// Mirror of the response encoder for the client's outbound way.
pub struct RequestEncoder {
    head_encoder: RequestHeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_message_complete(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self { head_encoder: RequestHeadEncoder, payload_encoder: None }
    }
}

// Pinned to `Bytes` chunks, like the response encoder, so the framed writer
// implements `Sink` for exactly one item type.
impl Encoder<Message<(RequestHead, PayloadSize)>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("request head sent while previous entity is incomplete");
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
                    error!("entity item sent before request head");
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
    use http::{Method, Request};

    #[test]
    fn encodes_post_with_body() {
        let head: RequestHead =
            Request::builder().method(Method::POST).uri("http://example.com/submit").body(()).unwrap().into();

        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Length(4))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"data"))), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.starts_with("POST /submit HTTP/1.1\r\n"));
        assert!(wire.contains("host: example.com\r\n"));
        assert!(wire.contains("content-length: 4\r\n"));
        assert!(wire.ends_with("\r\n\r\ndata"));
        assert!(encoder.is_message_complete());
    }

    #[test]
    fn get_without_body_completes_at_head() {
        let head: RequestHead = Request::builder().uri("http://example.com/").body(()).unwrap().into();

        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Empty)), &mut dst).unwrap();
        assert!(encoder.is_message_complete());

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.starts_with("GET / HTTP/1.1\r\n"));
        assert!(!wire.contains("content-length"));
    }
}
