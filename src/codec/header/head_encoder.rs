//! Start line and header block encoders.
//!
//! Framing headers (`Content-Length`, `Transfer-Encoding`) are derived from
//! the [`PayloadSize`] chosen upstream rather than trusted from the header
//! map, so the serialized head always agrees with the entity that follows it.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{header, HeaderValue, Method, StatusCode, Version};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadSize, RequestHead, ResponseHead, SendError};

/// Initial buffer reservation for one serialized head block.
const INIT_HEAD_SIZE: usize = 4 * 1024;

const CHUNKED_VALUE: HeaderValue = HeaderValue::from_static("chunked");
const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");

pub struct ResponseHeadEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for ResponseHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEAD_SIZE);
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            version_str(head.version())?,
            head.status().as_str(),
            head.status().canonical_reason().unwrap_or("Unknown")
        )?;

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
                head.headers_mut().remove(header::TRANSFER_ENCODING);
            }
            PayloadSize::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, CHUNKED_VALUE);
                head.headers_mut().remove(header::CONTENT_LENGTH);
            }
            // framed by connection close, no length headers at all
            PayloadSize::UntilClose => {
                head.headers_mut().remove(header::CONTENT_LENGTH);
                head.headers_mut().remove(header::TRANSFER_ENCODING);
            }
            PayloadSize::Empty => {
                head.headers_mut().remove(header::TRANSFER_ENCODING);
                let status = head.status();
                if status.is_informational() || status == StatusCode::NO_CONTENT {
                    // must not advertise an entity at all
                    head.headers_mut().remove(header::CONTENT_LENGTH);
                } else if status == StatusCode::NOT_MODIFIED {
                    // entity headers describe the validated representation, keep them
                } else if !head.headers().contains_key(header::CONTENT_LENGTH) {
                    // keep a caller-supplied length (the HEAD case), default to zero
                    head.headers_mut().insert(header::CONTENT_LENGTH, ZERO_VALUE);
                }
            }
        }

        write_headers(&head.headers().iter().collect::<Vec<_>>(), dst);
        Ok(())
    }
}

pub struct RequestHeadEncoder;

impl Encoder<(RequestHead, PayloadSize)> for RequestHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;
        let mut head = head.into_inner();

        dst.reserve(INIT_HEAD_SIZE);

        let target = request_target(head.method(), head.uri());
        write!(FastWrite(dst), "{} {} {}\r\n", head.method(), target, version_str(head.version())?)?;

        if !head.headers().contains_key(header::HOST) {
            if let Some(authority) = head.uri().authority() {
                let host = HeaderValue::from_str(authority.as_str())
                    .map_err(|_| SendError::invalid_body("uri authority is not a valid host header"))?;
                head.headers_mut().insert(header::HOST, host);
            }
        }

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
                head.headers_mut().remove(header::TRANSFER_ENCODING);
            }
            PayloadSize::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, CHUNKED_VALUE);
                head.headers_mut().remove(header::CONTENT_LENGTH);
            }
            // requests cannot be close-delimited, treat as empty
            PayloadSize::UntilClose | PayloadSize::Empty => {
                head.headers_mut().remove(header::CONTENT_LENGTH);
                head.headers_mut().remove(header::TRANSFER_ENCODING);
            }
        }

        // Host first, then the rest in map order
        let mut ordered: Vec<(&header::HeaderName, &HeaderValue)> = Vec::with_capacity(head.headers().len());
        if let Some(host) = head.headers().get(header::HOST) {
            ordered.push((&header::HOST, host));
        }
        ordered.extend(head.headers().iter().filter(|(name, _)| **name != header::HOST));

        write_headers(&ordered, dst);
        Ok(())
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => Err(SendError::unsupported_version(format!("{v:?}"))),
    }
}

/// Request target for the start line: origin-form for regular methods,
/// authority-form for CONNECT.
fn request_target(method: &Method, uri: &http::Uri) -> String {
    if method == Method::CONNECT {
        return uri.authority().map(|a| a.to_string()).unwrap_or_else(|| uri.to_string());
    }

    match uri.path_and_query() {
        Some(pq) => pq.to_string(),
        None => "/".to_string(),
    }
}

fn write_headers(headers: &[(&header::HeaderName, &HeaderValue)], dst: &mut BytesMut) {
    for (name, value) in headers {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Writer shim over `BytesMut`, space is reserved up front.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response, StatusCode};

    fn encode_response(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        ResponseHeadEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn fixed_length_response_head() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode_response(head, PayloadSize::Length(5));
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn chunked_wins_over_stale_content_length() {
        let head = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "999").body(()).unwrap();
        let wire = encode_response(head, PayloadSize::Chunked);
        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(!wire.contains("content-length"));
    }

    #[test]
    fn no_content_has_no_length_headers() {
        let head = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        let wire = encode_response(head, PayloadSize::Empty);
        assert!(wire.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!wire.contains("content-length"));
        assert!(!wire.contains("transfer-encoding"));
    }

    #[test]
    fn empty_two_hundred_gets_zero_length() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode_response(head, PayloadSize::Empty);
        assert!(wire.contains("content-length: 0\r\n"));
    }

    #[test]
    fn empty_keeps_caller_supplied_length() {
        // the HEAD case: real entity length advertised, no body follows
        let head = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "1234").body(()).unwrap();
        let wire = encode_response(head, PayloadSize::Empty);
        assert!(wire.contains("content-length: 1234\r\n"));
    }

    #[test]
    fn close_delimited_drops_length_headers() {
        let head =
            Response::builder().status(StatusCode::OK).version(Version::HTTP_10).header(header::CONTENT_LENGTH, "7").body(()).unwrap();
        let wire = encode_response(head, PayloadSize::UntilClose);
        assert!(wire.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(!wire.contains("content-length"));
    }

    #[test]
    fn request_head_gets_host_from_uri() {
        let head: RequestHead = Request::builder()
            .method(Method::GET)
            .uri("http://example.com/a/b?q=1")
            .body(())
            .unwrap()
            .into();

        let mut dst = BytesMut::new();
        RequestHeadEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap();
        let wire = String::from_utf8(dst.to_vec()).unwrap();

        assert!(wire.starts_with("GET /a/b?q=1 HTTP/1.1\r\n"));
        assert!(wire.contains("host: example.com\r\n"));
    }

    #[test]
    fn http2_version_is_rejected() {
        let head = Response::builder().status(StatusCode::OK).version(Version::HTTP_2).body(()).unwrap();
        let mut dst = BytesMut::new();
        let err = ResponseHeadEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::UnsupportedVersion { .. }));
    }
}
