//! Server-side request decoder: head first, then the entity stream.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{RequestHeadDecoder, DEFAULT_MAX_HEAD_BYTES};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

/// Two-phase decoder for inbound requests.
///
/// Between messages it parses a head block and announces the entity framing;
/// while `payload_decoder` is armed it yields entity items until `Eof`, at
/// which point it flips back to head parsing. This keeps the stream aligned on
/// message boundaries, which is what makes pipelined requests safe to read
/// back to back from one buffer.
pub struct RequestDecoder {
    head_decoder: RequestHeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(max_head_bytes: usize) -> Self {
        Self { head_decoder: RequestHeadDecoder::new(max_head_bytes), payload_decoder: None }
    }

    pub fn with_limits(max_head_bytes: usize, max_headers: usize) -> Self {
        Self { head_decoder: RequestHeadDecoder::with_limits(max_head_bytes, max_headers), payload_decoder: None }
    }

    /// True while the decoder is mid-entity. An EOF in this state means the
    /// peer truncated the message.
    pub fn is_decoding_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_BYTES)
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
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

        let message = match self.head_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
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
            // clean close between messages
            Ok(None)
        } else {
            Err(ParseError::io(io::Error::from(io::ErrorKind::UnexpectedEof)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    fn decode_all(decoder: &mut RequestDecoder, buf: &mut BytesMut) -> Vec<Message<(RequestHead, PayloadSize)>> {
        let mut messages = Vec::new();
        while let Some(message) = decoder.decode(buf).unwrap() {
            let eof = matches!(message, Message::Payload(PayloadItem::Eof));
            messages.push(message);
            if eof {
                break;
            }
        }
        messages
    }

    #[test]
    fn decodes_request_with_fixed_body() {
        let mut buf = BytesMut::from(indoc! {"
            POST /upload HTTP/1.1\r
            Host: example.com\r
            Content-Length: 5\r
            \r
            hello"});
        let mut decoder = RequestDecoder::default();

        let messages = decode_all(&mut decoder, &mut buf);
        assert_eq!(messages.len(), 3);

        let Message::Header((head, payload_size)) = &messages[0] else { panic!("expected head") };
        assert_eq!(head.method(), &Method::POST);
        assert_eq!(*payload_size, PayloadSize::Length(5));

        let Message::Payload(PayloadItem::Chunk(data)) = &messages[1] else { panic!("expected chunk") };
        assert_eq!(&data[..], b"hello");

        assert!(matches!(messages[2], Message::Payload(PayloadItem::Eof)));
        assert!(!decoder.is_decoding_payload());
    }

    #[test]
    fn pipelined_requests_stay_aligned() {
        let mut buf = BytesMut::from(
            "GET /a HTTP/1.1\r\nHost: h\r\n\r\nPOST /b HTTP/1.1\r\nHost: h\r\nContent-Length: 2\r\n\r\nokGET /c HTTP/1.1\r\nHost: h\r\n\r\n",
        );
        let mut decoder = RequestDecoder::default();

        let mut paths = Vec::new();
        loop {
            match decoder.decode(&mut buf).unwrap() {
                Some(Message::Header((head, _))) => paths.push(head.uri().path().to_string()),
                Some(Message::Payload(_)) => {}
                None => break,
            }
        }

        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn eof_mid_body_is_truncation() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\nabc");
        let mut decoder = RequestDecoder::default();

        assert!(matches!(decoder.decode(&mut buf).unwrap(), Some(Message::Header(_))));
        assert!(matches!(decoder.decode(&mut buf).unwrap(), Some(Message::Payload(PayloadItem::Chunk(_)))));

        let err = decoder.decode_eof(&mut buf).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn eof_mid_head_is_an_error() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHost");
        let mut decoder = RequestDecoder::default();

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn clean_eof_between_messages() {
        let mut buf = BytesMut::new();
        let mut decoder = RequestDecoder::default();
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    }
}
