//! Application handler contract.
//!
//! One [`Handler::call`] per request exchange. The handler receives the
//! request with a streaming [`ReqBody`] and returns any `http_body::Body`
//! response; the connection decides the wire framing from the body's size
//! hint. Handlers run on spawned tasks, so the trait requires `Send` futures.

use std::error::Error;
use std::future::Future;

use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::ReqBody;

/// Boxed error type accepted from handlers and response bodies.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[trait_variant::make(Send)]
pub trait Handler {
    type RespBody: Body;
    type Error: Into<BoxError>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// Adapter turning a plain async function into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Body,
    Err: Into<BoxError>,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn handler_fn<F, RespBody, Err, Fut>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<BoxError>,
    F: Fn(Request<ReqBody>) -> Fut,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
{
    HandlerFn { f }
}
