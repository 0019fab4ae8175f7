//! Request head decoder: start line plus header block.
//!
//! The decoder is restartable across non-blocking reads: nothing is consumed
//! until the full `CRLFCRLF` head terminator is buffered, so feeding the same
//! stream one byte at a time yields the same result as feeding it at once.
//! Parsing past the header block never happens before the terminator is seen.
//!
//! Header-continuation lines (obs-fold, leading SP/HTAB) are unfolded in
//! place before parsing. Duplicate header names are preserved as distinct
//! entries in arrival order; empty values are legal.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::{find_head_end, unfold_in_place, HeaderIndex, EMPTY_HEADER_INDEX_ARRAY, MAX_HEADER_NUM};
use crate::protocol::{ParseError, PayloadSize, RequestHead};
use crate::utils::ensure;

/// Default cap for the whole head section.
pub(crate) const DEFAULT_MAX_HEAD_BYTES: usize = 8 * 1024;

/// Decoder for inbound request heads, yielding the head and the entity
/// framing derived from its headers.
pub struct RequestHeadDecoder {
    max_head_bytes: usize,
    max_headers: usize,
    /// Bytes already scanned for the head terminator, to avoid rescans.
    scanned: usize,
}

impl RequestHeadDecoder {
    pub fn new(max_head_bytes: usize) -> Self {
        Self::with_limits(max_head_bytes, MAX_HEADER_NUM)
    }

    pub fn with_limits(max_head_bytes: usize, max_headers: usize) -> Self {
        Self { max_head_bytes, max_headers: max_headers.min(MAX_HEADER_NUM), scanned: 0 }
    }
}

impl Default for RequestHeadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_BYTES)
    }
}

impl Decoder for RequestHeadDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // the head block is parsed only once fully buffered
        let Some(head_end) = find_head_end(src, &mut self.scanned) else {
            ensure!(src.len() <= self.max_head_bytes, ParseError::too_large_header(src.len(), self.max_head_bytes));
            return Ok(None);
        };
        self.scanned = 0;

        ensure!(head_end <= self.max_head_bytes, ParseError::too_large_header(head_end, self.max_head_bytes));

        unfold_in_place(&mut src[..head_end]);

        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed request head");
                debug_assert_eq!(body_offset, head_end);

                let header_count = req.headers.len();
                ensure!(header_count <= self.max_headers, ParseError::too_many_headers(self.max_headers));

                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = match req.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(req.version)),
                };

                let mut header_builder = Request::builder()
                    .method(req.method.ok_or(ParseError::InvalidMethod)?)
                    .uri(req.path.ok_or(ParseError::InvalidUri)?)
                    .version(version);

                let headers = header_builder.headers_mut().ok_or(ParseError::InvalidUri)?;
                headers.reserve(header_count);

                let head_bytes = src.split_to(body_offset).freeze();
                for index in &header_index[..header_count] {
                    // httparse verified the name is valid ASCII
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1])
                        .map_err(|e| ParseError::invalid_header(e.to_string()))?;

                    // Safe: httparse verified the value contains only visible
                    // ASCII chars (plus the SP/HTAB unfolding introduced)
                    let value =
                        unsafe { HeaderValue::from_maybe_shared_unchecked(head_bytes.slice(index.value.0..index.value.1)) };

                    // append keeps duplicates distinct and in arrival order
                    headers.append(name, value);
                }

                let head = RequestHead::from(
                    header_builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?,
                );
                let payload_size = request_payload_size(&head)?;

                Ok(Some((head, payload_size)))
            }
            Status::Partial => {
                // terminator was found, so httparse must complete
                Err(ParseError::invalid_header("head terminator present but head did not parse"))
            }
        }
    }
}

/// Picks the entity framing for a request per RFC 7230 section 3.3.
///
/// Requests are never close-delimited: with no framing headers the entity is
/// empty. A `Transfer-Encoding` that does not end in `chunked` leaves the
/// request unframable (section 3.3.3) and is rejected, as is combining it
/// with `Content-Length`.
fn request_payload_size(head: &RequestHead) -> Result<PayloadSize, ParseError> {
    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_header("transfer-encoding without a final chunked coding"))
            }
        }

        (None, Some(cl_value)) => parse_content_length(cl_value).map(PayloadSize::Length),

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present"))
        }
    }
}

pub(crate) fn parse_content_length(cl_value: &HeaderValue) -> Result<u64, ParseError> {
    let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value is not a string"))?;
    cl_str
        .trim()
        .parse::<u64>()
        .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not a u64")))
}

/// Chunked must be the final encoding listed to count as chunked framing.
pub(crate) fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii() == CHUNKED;
        }
    }
    false
}
