//! Connection layer: per-direction ways and the connection that pairs them.
//!
//! An [`InboundWay`] owns the read half and its parse state; an
//! [`OutboundWay`] owns the write half and the response reorder queue;
//! [`HttpConnection`] pairs the two over one transport and drives them
//! concurrently on a single task.

mod http_connection;
mod inbound;
mod outbound;

pub use http_connection::{ConnectionState, HttpConnection};
pub use inbound::InboundWay;
pub use outbound::OutboundWay;
