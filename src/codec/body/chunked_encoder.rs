//! Encoder for chunked transfer encoding.
//!
//! Emits each chunk as `<hex-size>\r\n<bytes>\r\n`. Trailer fields, when
//! present, ride after the zero-size chunk; otherwise the terminal sequence is
//! `0\r\n\r\n`.

use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Emitting data chunks
    Chunking,
    /// Zero chunk and trailers written, final CRLF still owed
    Trailed,
    /// Terminal sequence written
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    state: State,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { state: State::Chunking }
    }

    pub fn is_finish(&self) -> bool {
        self.state == State::End
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.state == State::End {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if self.state == State::Trailed {
                    warn!("chunk offered after trailers, dropping it");
                    return Ok(());
                }
                if !bytes.has_remaining() {
                    // a zero-size chunk would terminate the entity early
                    return Ok(());
                }
                write!(Writer(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Trailers(trailers) => {
                if self.state == State::Trailed {
                    warn!("second trailer block offered, dropping it");
                    return Ok(());
                }
                dst.extend_from_slice(b"0\r\n");
                for (name, value) in trailers.iter() {
                    dst.extend_from_slice(name.as_ref());
                    dst.extend_from_slice(b": ");
                    dst.extend_from_slice(value.as_ref());
                    dst.extend_from_slice(b"\r\n");
                }
                self.state = State::Trailed;
                Ok(())
            }
            PayloadItem::Eof => {
                match self.state {
                    State::Chunking => dst.extend_from_slice(b"0\r\n\r\n"),
                    State::Trailed => dst.extend_from_slice(b"\r\n"),
                    State::End => {}
                }
                self.state = State::End;
                Ok(())
            }
        }
    }
}

struct Writer<'a>(&'a mut BytesMut);

impl Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    #[test]
    fn chunks_then_terminal() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b", world")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
    }

    #[test]
    fn trailers_ride_the_zero_chunk() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hi")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Trailers(trailers), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"2\r\nhi\r\n0\r\nx-checksum: abc123\r\n\r\n");
        assert!(encoder.is_finish());
    }

    #[test]
    fn empty_chunk_is_not_emitted() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert!(dst.is_empty());

        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"0\r\n\r\n");
    }
}
