//! Decoder for entities framed by a `Content-Length` header.
//!
//! Delivers exactly the declared number of bytes. A channel EOF before the
//! declared length is reached is a framing error, never a silent short body.

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Tracks the bytes still owed by the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            // EOF with bytes still owed: the declared length never completed
            None => Err(ParseError::truncated(self.remaining)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_declared_length() {
        let mut buffer = BytesMut::from(&b"1012345678rest-of-stream"[..]);

        let mut decoder = LengthDecoder::new(10);
        let payload = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(payload.is_chunk());

        let bytes = payload.as_bytes().unwrap();
        assert_eq!(&bytes[..], b"1012345678");
        assert_eq!(&buffer[..], b"rest-of-stream");

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn empty_buffer_needs_more_data() {
        let mut decoder = LengthDecoder::new(4);
        assert!(decoder.decode(&mut BytesMut::new()).unwrap().is_none());
    }

    #[test]
    fn eof_one_byte_short_is_truncation() {
        let mut buffer = BytesMut::from(&b"123"[..]);
        let mut decoder = LengthDecoder::new(4);

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), 3);

        let err = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(matches!(err, ParseError::TruncatedEntity { remaining: 1 }));
    }

    #[test]
    fn eof_at_exact_length_is_clean() {
        let mut buffer = BytesMut::from(&b"1234"[..]);
        let mut decoder = LengthDecoder::new(4);

        decoder.decode(&mut buffer).unwrap().unwrap();
        let eof = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }
}
