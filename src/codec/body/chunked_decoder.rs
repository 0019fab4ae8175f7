//! Decoder for HTTP chunked transfer encoding
//! ([RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//!
//! Each chunk is a hex size line (optional extensions are accepted and
//! discarded), the chunk data, and a CRLF. A zero-size chunk ends the entity;
//! trailer fields after it are captured and handed to the consumer so they can
//! be merged into the message's header set.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Maximum trailer fields accepted after the final chunk.
const MAX_TRAILER_NUM: usize = 16;

/// Maximum bytes accepted for the whole trailer section.
const MAX_TRAILER_BYTES: usize = 4 * 1024;

/// State machine for chunked entities, restartable at any byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    /// Raw trailer lines, verbatim, parsed once the terminator is seen.
    trailer_buf: BytesMut,
    /// Parsed trailers awaiting delivery, just before EOF.
    trailers: Option<HeaderMap>,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, trailer_buf: BytesMut::new(), trailers: None }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Reading the chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skipping chunk extensions
    Extension,
    /// LF ending the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Inside a trailer field line
    Trailer,
    /// LF ending a trailer line
    TrailerLf,
    /// Final CR
    EndCr,
    /// Final LF
    EndLf,
    /// Terminal state
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                if let Some(trailers) = self.trailers.take() {
                    trace!(count = trailers.len(), "delivering chunked trailers");
                    return Ok(Some(PayloadItem::Trailers(trailers)));
                }
                trace!("finished reading chunked entity");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match step(self.state, src, &mut self.remaining_size, &mut buf, &mut self.trailer_buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if self.state == End && !self.trailer_buf.is_empty() {
                let trailers = parse_trailers(&mut self.trailer_buf)?;
                if !trailers.is_empty() {
                    self.trailers = Some(trailers);
                }
            }

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            // EOF before the terminal chunk: the chunked framing never completed
            None => Err(ParseError::truncated(self.remaining_size)),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

/// Advances the state machine by at most one byte (or one chunk-data slice).
fn step(
    state: ChunkedState,
    src: &mut BytesMut,
    remaining_size: &mut u64,
    buf: &mut Option<Bytes>,
    trailer: &mut BytesMut,
) -> Poll<Result<ChunkedState, ParseError>> {
    match state {
        Size => read_size(src, remaining_size),
        SizeLws => read_size_lws(src),
        Extension => read_extension(src),
        SizeLf => read_size_lf(src, remaining_size),
        Body => read_body(src, remaining_size, buf),
        BodyCr => read_body_cr(src),
        BodyLf => read_body_lf(src),
        Trailer => read_trailer(src, trailer),
        TrailerLf => read_trailer_lf(src, trailer),
        EndCr => read_end_cr(src, trailer),
        EndLf => read_end_lf(src),
        End => Poll::Ready(Ok(End)),
    }
}

/// Reads the chunk size, one hex digit at a time.
fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
    macro_rules! or_overflow {
        ($e:expr) => {
            match $e {
                Some(val) => val,
                None => return Poll::Ready(Err(ParseError::invalid_chunk("chunk size overflows u64"))),
            }
        };
    }

    let radix = 16;
    match try_next_byte!(src) {
        b @ b'0'..=b'9' => {
            *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
            *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b - b'0') as u64));
        }
        b @ b'a'..=b'f' => {
            *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
            *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b + 10 - b'a') as u64));
        }
        b @ b'A'..=b'F' => {
            *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
            *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b + 10 - b'A') as u64));
        }
        b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
        b';' => return Poll::Ready(Ok(Extension)),
        b'\r' => return Poll::Ready(Ok(SizeLf)),

        _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line"))),
    }

    Poll::Ready(Ok(Size))
}

/// Linear whitespace after the chunk size; no further digits may follow.
fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
        b';' => Poll::Ready(Ok(Extension)),
        b'\r' => Poll::Ready(Ok(SizeLf)),
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size linear white space"))),
    }
}

/// Chunk extensions are accepted and discarded; they end at CRLF.
///
/// A bare LF inside an extension is rejected, since lenient peers may treat
/// it as a line terminator.
fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\r' => Poll::Ready(Ok(SizeLf)),
        b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("chunk extension contains bare newline"))),
        _ => Poll::Ready(Ok(Extension)),
    }
}

/// LF ending the size line; a zero size means the entity is complete.
fn read_size_lf(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\n' => {
            if *size_per_chunk == 0 {
                Poll::Ready(Ok(EndCr))
            } else {
                Poll::Ready(Ok(Body))
            }
        }
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size LF"))),
    }
}

/// Hands out as much chunk data as is buffered, up to the chunk size.
fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
    if src.is_empty() {
        return Poll::Ready(Ok(Body));
    }

    if *size_per_chunk == 0 {
        return Poll::Ready(Ok(BodyCr));
    }

    // cap at usize for the split below
    let remaining = match *size_per_chunk {
        r if r > usize::MAX as u64 => usize::MAX,
        r => r as usize,
    };

    let read_size = std::cmp::min(remaining, src.len());

    *size_per_chunk -= read_size as u64;
    let bytes = src.split_to(read_size).freeze();
    *buf = Some(bytes);

    if *size_per_chunk > 0 {
        Poll::Ready(Ok(Body))
    } else {
        Poll::Ready(Ok(BodyCr))
    }
}

fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\r' => Poll::Ready(Ok(BodyLf)),
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body CR"))),
    }
}

fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\n' => Poll::Ready(Ok(Size)),
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body LF"))),
    }
}

/// Accumulates a trailer line byte by byte, CR included.
fn read_trailer(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    if trailer.len() >= MAX_TRAILER_BYTES {
        return Poll::Ready(Err(ParseError::invalid_chunk("trailer section too large")));
    }

    match try_next_byte!(src) {
        b'\r' => {
            trailer.extend_from_slice(b"\r");
            Poll::Ready(Ok(TrailerLf))
        }
        b => {
            trailer.extend_from_slice(&[b]);
            Poll::Ready(Ok(Trailer))
        }
    }
}

fn read_trailer_lf(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\n' => {
            trailer.extend_from_slice(b"\n");
            Poll::Ready(Ok(EndCr))
        }
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid trailer line LF"))),
    }
}

/// Either the final CR, or the first byte of another trailer line.
fn read_end_cr(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\r' => Poll::Ready(Ok(EndLf)),
        b => {
            trailer.extend_from_slice(&[b]);
            Poll::Ready(Ok(Trailer))
        }
    }
}

fn read_end_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
    match try_next_byte!(src) {
        b'\n' => Poll::Ready(Ok(End)),
        _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk end LF"))),
    }
}

/// Parses the accumulated trailer lines into a header map.
fn parse_trailers(raw: &mut BytesMut) -> Result<HeaderMap, ParseError> {
    // parse_headers needs the empty-line terminator the state machine consumed
    raw.extend_from_slice(b"\r\n");

    let mut parsed = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
    let trailers = match httparse::parse_headers(raw, &mut parsed) {
        Ok(httparse::Status::Complete((_, trailers))) => trailers,
        Ok(httparse::Status::Partial) => return Err(ParseError::invalid_chunk("incomplete trailer section")),
        Err(e) => return Err(ParseError::invalid_chunk(format!("invalid trailer field: {e}"))),
    };

    let mut map = HeaderMap::with_capacity(trailers.len());
    for trailer in trailers {
        let name = HeaderName::from_bytes(trailer.name.as_bytes())
            .map_err(|_| ParseError::invalid_chunk("invalid trailer field name"))?;
        let value = HeaderValue::from_bytes(trailer.value)
            .map_err(|_| ParseError::invalid_chunk("invalid trailer field value"))?;
        map.append(name, value);
    }

    raw.clear();
    Ok(map)
}
