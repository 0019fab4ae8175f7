//! Entity stream codecs: translate the wire framing of a message body to and
//! from a plain byte stream.
//!
//! Three framings exist on the wire — fixed `Content-Length`, chunked
//! transfer encoding, and close-delimited (responses only) — plus the no-body
//! case. [`PayloadDecoder`] and [`PayloadEncoder`] are enum-dispatched unions
//! over them; the head codecs choose the variant from the message headers.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;
mod until_close_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
