//! Encoder for entities with a declared `Content-Length`.

use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                if self.remaining == 0 {
                    warn!("entity bytes offered beyond the declared content-length, dropping them");
                    return Ok(());
                }

                let allowed = std::cmp::min(self.remaining, bytes.remaining() as u64) as usize;
                if (allowed as u64) < bytes.remaining() as u64 {
                    warn!(over = bytes.remaining() - allowed, "entity exceeds declared content-length, truncating");
                }

                dst.extend_from_slice(&bytes.copy_to_bytes(allowed));
                self.remaining -= allowed as u64;
                Ok(())
            }
            PayloadItem::Trailers(_) => {
                // trailers only exist in chunked framing
                warn!("trailers offered for a fixed-length entity, dropping them");
                Ok(())
            }
            PayloadItem::Eof => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_exactly_declared_bytes() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"hello");
        assert!(encoder.is_finish());

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"extra")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"hello");
    }

    #[test]
    fn truncates_overlong_chunk() {
        let mut encoder = LengthEncoder::new(3);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"hel");
        assert!(encoder.is_finish());
    }
}
