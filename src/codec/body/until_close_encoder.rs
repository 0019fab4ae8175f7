//! Encoder for close-delimited response entities.
//!
//! Raw pass-through; the end of the entity is signaled by closing the
//! connection, so the owning way must have marked the connection
//! non-persistent before choosing this framing. Used for responses to
//! HTTP/1.0 peers when the entity size is unknown (chunked is not an option).

use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntilCloseEncoder {
    eof: bool,
}

impl UntilCloseEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl Default for UntilCloseEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for UntilCloseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(mut bytes) => {
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    dst.extend_from_slice(chunk);
                    let len = chunk.len();
                    bytes.advance(len);
                }
                Ok(())
            }
            PayloadItem::Trailers(_) => {
                warn!("trailers offered for a close-delimited entity, dropping them");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                Ok(())
            }
        }
    }
}
