//! Inbound request head handling.
//!
//! Wraps `http::Request<()>` with the connection-level policy the engine
//! derives from a request head: persistence, expect-continue and whether the
//! request may carry an entity.

use http::header::{CONNECTION, EXPECT};
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// The start line and header block of an inbound request.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, turning the head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether this request may carry an entity.
    ///
    /// GET, HEAD, DELETE, OPTIONS and CONNECT requests are treated as
    /// body-less unless framing headers say otherwise.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the connection stays open after this exchange.
    ///
    /// HTTP/1.1 defaults to persistent unless `Connection: close` is present;
    /// HTTP/1.0 defaults to close unless `Connection: keep-alive` opts in.
    pub fn is_persistent(&self) -> bool {
        match self.version() {
            Version::HTTP_11 => !self.connection_header_has("close"),
            Version::HTTP_10 => self.connection_header_has("keep-alive"),
            _ => false,
        }
    }

    /// Whether the client asked for an interim `100 Continue` before sending
    /// the entity.
    pub fn expects_continue(&self) -> bool {
        match self.headers().get(EXPECT) {
            Some(value) => value.as_bytes().len() >= 4 && value.as_bytes()[..4].eq_ignore_ascii_case(b"100-"),
            None => false,
        }
    }

    fn connection_header_has(&self, token: &str) -> bool {
        self.headers()
            .get_all(CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|item| item.trim().eq_ignore_ascii_case(token))
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: Version, headers: &[(&str, &str)]) -> RequestHead {
        let mut builder = Request::builder().method(Method::GET).uri("/").version(version);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        RequestHead::from(builder.body(()).unwrap())
    }

    #[test]
    fn http11_is_persistent_by_default() {
        assert!(head(Version::HTTP_11, &[]).is_persistent());
    }

    #[test]
    fn http11_close_header_disables_persistence() {
        assert!(!head(Version::HTTP_11, &[("connection", "close")]).is_persistent());
        assert!(!head(Version::HTTP_11, &[("connection", "Close")]).is_persistent());
        assert!(!head(Version::HTTP_11, &[("connection", "keep-alive, close")]).is_persistent());
    }

    #[test]
    fn http10_requires_keep_alive_opt_in() {
        assert!(!head(Version::HTTP_10, &[]).is_persistent());
        assert!(head(Version::HTTP_10, &[("connection", "keep-alive")]).is_persistent());
    }

    #[test]
    fn expect_continue_detection() {
        assert!(head(Version::HTTP_11, &[("expect", "100-continue")]).expects_continue());
        assert!(!head(Version::HTTP_11, &[]).expects_continue());
    }
}
