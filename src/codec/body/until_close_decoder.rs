//! Decoder for close-delimited response entities.
//!
//! When a response declares neither `Content-Length` nor chunked encoding,
//! the body runs until the peer closes the connection; channel EOF is the
//! clean end of the entity, not an error. Never legal for requests.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntilCloseDecoder {
    eof: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self { eof: false }
    }
}

impl Default for UntilCloseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.eof {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let bytes = src.split().freeze();
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        self.eof = true;
        Ok(Some(PayloadItem::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_bytes_through_until_eof() {
        let mut decoder = UntilCloseDecoder::new();
        let mut buffer = BytesMut::from(&b"anything goes"[..]);

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"anything goes");

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        let eof = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn eof_with_buffered_bytes_flushes_first() {
        let mut decoder = UntilCloseDecoder::new();
        let mut buffer = BytesMut::from(&b"tail"[..]);

        let chunk = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"tail");

        let eof = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }
}
