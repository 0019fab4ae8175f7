//! Client-side response decoder: head first, then the entity stream.

use std::io;

use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{ResponseHeadDecoder, DEFAULT_MAX_HEAD_BYTES};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};

/// Two-phase decoder for inbound responses.
///
/// Must be armed with [`prepare`](Self::prepare) before each exchange so the
/// head decoder knows the request method (HEAD responses carry framing
/// headers but no entity). Interim 1xx responses are logged and skipped, the
/// decoder keeps reading until the exchange's final response arrives.
pub struct ResponseDecoder {
    head_decoder: ResponseHeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new(max_head_bytes: usize) -> Self {
        Self { head_decoder: ResponseHeadDecoder::new(max_head_bytes), payload_decoder: None }
    }

    pub fn with_limits(max_head_bytes: usize, max_headers: usize) -> Self {
        Self { head_decoder: ResponseHeadDecoder::with_limits(max_head_bytes, max_headers), payload_decoder: None }
    }

    /// Arms the decoder for the next exchange.
    pub fn prepare(&mut self, method: Method) {
        self.head_decoder.prepare(method);
    }

    pub fn is_decoding_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_BYTES)
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                Some(item) => Some(Message::Payload(item)),
                None => None,
            };

            return Ok(message);
        }

        loop {
            match self.head_decoder.decode(src)? {
                Some((head, _)) if head.status().is_informational() => {
                    debug!(status = %head.status(), "skipping interim response");
                    continue;
                }
                Some((head, payload_size)) => {
                    self.payload_decoder = Some(payload_size.into());
                    return Ok(Some(Message::Header((head, payload_size))));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode_eof(src)? {
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                Some(item) => Some(Message::Payload(item)),
                None => None,
            };

            return Ok(message);
        }

        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        if src.is_empty() {
            Ok(None)
        } else {
            Err(ParseError::io(io::Error::from(io::ErrorKind::UnexpectedEof)))
        }
    }
}
