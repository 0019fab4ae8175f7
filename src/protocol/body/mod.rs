//! Inbound entity streaming.
//!
//! A request entity is bridged from the connection task to the handler task
//! through a channel pair:
//!
//! - [`ReqBody`]: the consumer side, an `http_body::Body` given to the handler
//! - [`ReqBodySender`]: the producer side, driven by the inbound way
//!
//! The split keeps the transport single-owner (only the connection task reads
//! bytes) while letting a slow handler run elsewhere. The sender tracks EOF so
//! the way knows when the message boundary has been reached, and `drain`
//! disposes of whatever the handler did not read, which is what keeps
//! persistent connections and pipelining correct.

mod req_body;

pub use req_body::ReqBody;
pub use req_body::ReqBodySender;
