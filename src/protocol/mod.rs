//! Core protocol types shared by the codecs, ways and connectors.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: the framing vocabulary a
//!   way produces and consumes
//! - [`RequestHead`] / [`ResponseHead`]: start line + header block of a
//!   message, before the entity is attached
//! - [`body`]: the channel pair that streams an inbound entity to a handler
//! - [`HttpError`], [`ParseError`], [`SendError`]: the error taxonomy —
//!   protocol errors, truncated entities and transport failures are distinct
//!   variants so callers can pattern-match on the kind

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::status_forbids_body;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
