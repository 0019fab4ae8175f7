//! Streaming codecs for HTTP/1.1 message exchange.
//!
//! The message codecs ([`RequestDecoder`], [`ResponseEncoder`] on the server,
//! [`RequestEncoder`], [`ResponseDecoder`] on the client) compose a head
//! codec with an entity codec and keep the two phases aligned, so a way can
//! drive them through `FramedRead`/`FramedWrite` without tracking framing
//! state itself. All decoders tolerate arbitrarily fragmented input: a decode
//! call that cannot make progress consumes nothing and returns `None`.

pub mod body;
pub mod header;

mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
