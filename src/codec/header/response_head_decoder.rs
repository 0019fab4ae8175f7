//! Response head decoder (client side).
//!
//! Same restartable contract as the request head decoder. Entity framing for
//! a response depends on the request method and the status code as well as
//! the framing headers, so the decoder is primed with the method of the
//! exchange it is reading.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

use crate::codec::header::request_head_decoder::{is_chunked, parse_content_length};
use crate::codec::header::{
    find_head_end, unfold_in_place, HeaderIndex, DEFAULT_MAX_HEAD_BYTES, EMPTY_HEADER_INDEX_ARRAY, MAX_HEADER_NUM,
};
use crate::protocol::{status_forbids_body, ParseError, PayloadSize, ResponseHead};
use crate::utils::ensure;

pub struct ResponseHeadDecoder {
    max_head_bytes: usize,
    max_headers: usize,
    scanned: usize,
    /// Method of the request this response answers; HEAD suppresses the body.
    request_method: Method,
}

impl ResponseHeadDecoder {
    pub fn new(max_head_bytes: usize) -> Self {
        Self::with_limits(max_head_bytes, MAX_HEADER_NUM)
    }

    pub fn with_limits(max_head_bytes: usize, max_headers: usize) -> Self {
        Self { max_head_bytes, max_headers: max_headers.min(MAX_HEADER_NUM), scanned: 0, request_method: Method::GET }
    }

    /// Arms the decoder for the next exchange.
    pub fn prepare(&mut self, method: Method) {
        self.request_method = method;
        self.scanned = 0;
    }
}

impl Default for ResponseHeadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_BYTES)
    }
}

impl Decoder for ResponseHeadDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(head_end) = find_head_end(src, &mut self.scanned) else {
            ensure!(src.len() <= self.max_head_bytes, ParseError::too_large_header(src.len(), self.max_head_bytes));
            return Ok(None);
        };
        self.scanned = 0;

        ensure!(head_end <= self.max_head_bytes, ParseError::too_large_header(head_end, self.max_head_bytes));

        unfold_in_place(&mut src[..head_end]);

        // httparse has no uninit-headers entry point for responses
        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut parsed_headers);

        let parsed_result = resp.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_start_line(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed response head");

                let header_count = resp.headers.len();
                ensure!(header_count <= self.max_headers, ParseError::too_many_headers(self.max_headers));

                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, resp.headers, &mut header_index);

                let version = match resp.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(resp.version)),
                };

                let status = StatusCode::from_u16(resp.code.ok_or_else(|| ParseError::invalid_start_line("missing status code"))?)
                    .map_err(|_| ParseError::invalid_start_line("status code out of range"))?;

                let mut header_builder = Response::builder().status(status).version(version);

                let headers = header_builder
                    .headers_mut()
                    .ok_or_else(|| ParseError::invalid_start_line("invalid response head"))?;
                headers.reserve(header_count);

                let head_bytes = src.split_to(body_offset).freeze();
                for index in &header_index[..header_count] {
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1])
                        .map_err(|e| ParseError::invalid_header(e.to_string()))?;

                    // Safe: httparse verified the value contains only visible
                    // ASCII chars (plus the SP/HTAB unfolding introduced)
                    let value =
                        unsafe { HeaderValue::from_maybe_shared_unchecked(head_bytes.slice(index.value.0..index.value.1)) };

                    headers.append(name, value);
                }

                let head = header_builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?;
                let payload_size = response_payload_size(&self.request_method, &head)?;

                Ok(Some((head, payload_size)))
            }
            Status::Partial => Err(ParseError::invalid_start_line("head terminator present but head did not parse")),
        }
    }
}

/// Picks the entity framing for a response.
///
/// HEAD exchanges and body-forbidding statuses have no entity regardless of
/// framing headers. Otherwise chunked wins over `Content-Length` (lenient,
/// per RFC 7230 section 3.3.3), and with neither header the entity is
/// close-delimited.
fn response_payload_size(request_method: &Method, head: &ResponseHead) -> Result<PayloadSize, ParseError> {
    if request_method == Method::HEAD || status_forbids_body(head.status()) {
        return Ok(PayloadSize::Empty);
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::UntilClose),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, Some(cl_value)) => parse_content_length(cl_value).map(PayloadSize::Length),

        (te_value @ Some(_), Some(_)) => {
            if is_chunked(te_value) {
                warn!("response carries both transfer-encoding and content-length, chunked wins");
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_content_length("transfer-encoding and content-length both present"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_length_response() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"[..]);
        let mut decoder = ResponseHeadDecoder::default();

        let (head, payload_size) = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&buf[..], b"hello");
    }

    #[test]
    fn head_request_response_has_no_entity() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n"[..]);
        let mut decoder = ResponseHeadDecoder::default();
        decoder.prepare(Method::HEAD);

        let (_, payload_size) = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(payload_size.is_empty());
    }

    #[test]
    fn no_framing_headers_means_until_close() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\n"[..]);
        let (_, payload_size) = ResponseHeadDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert!(payload_size.is_until_close());
    }

    #[test]
    fn not_modified_has_no_entity() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 304 Not Modified\r\nETag: \"abc\"\r\n\r\n"[..]);
        let (head, payload_size) = ResponseHeadDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.status(), StatusCode::NOT_MODIFIED);
        assert!(payload_size.is_empty());
    }

    #[test]
    fn chunked_response_framing() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
        let (_, payload_size) = ResponseHeadDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn byte_at_a_time_equals_all_at_once() {
        let wire = b"HTTP/1.1 201 Created\r\nLocation: /things/7\r\nServer: x\r\nContent-Length: 2\r\n\r\n";

        let mut all = BytesMut::from(&wire[..]);
        let (head_once, size_once) = ResponseHeadDecoder::default().decode(&mut all).unwrap().unwrap();

        let mut decoder = ResponseHeadDecoder::default();
        let mut trickle = BytesMut::new();
        let mut result = None;
        for byte in wire.iter() {
            trickle.extend_from_slice(&[*byte]);
            if let Some(parsed) = decoder.decode(&mut trickle).unwrap() {
                result = Some(parsed);
                break;
            }
        }

        let (head_trickle, size_trickle) = result.expect("head must parse once fully fed");
        assert_eq!(head_once.status(), StatusCode::CREATED);
        assert_eq!(head_once.status(), head_trickle.status());
        assert_eq!(head_once.headers(), head_trickle.headers());
        assert_eq!(head_once.headers().get(http::header::LOCATION).unwrap(), "/things/7");
        assert_eq!(size_once, size_trickle);
        assert_eq!(size_once, PayloadSize::Length(2));
    }

    #[test]
    fn partial_status_line_needs_more() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 20"[..]);
        assert!(ResponseHeadDecoder::default().decode(&mut buf).unwrap().is_none());
    }
}
