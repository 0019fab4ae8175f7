//! Connection tuning knobs shared by the server and client connectors.

use std::time::Duration;

use crate::codec::header::{DEFAULT_MAX_HEAD_BYTES, MAX_HEADER_NUM};

/// Per-connection limits and timeouts.
///
/// The defaults match the protocol constants used throughout the codecs:
/// 8 KiB head blocks and 64 headers. `max_headers` cannot exceed the codec's
/// hard cap of 64, higher values are clamped.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on one serialized head block (start line + headers).
    pub max_head_bytes: usize,

    /// Upper bound on the header count in one head block.
    pub max_headers: usize,

    /// How long a connection may sit idle between messages, and the bound on
    /// one entity transfer, before the engine closes it.
    pub idle_timeout: Duration,

    /// When false every exchange closes the connection, regardless of what
    /// the request asks for.
    pub keep_alive: bool,

    /// Maximum number of pipelined requests in flight per connection.
    pub max_pipelined: usize,

    /// Initial capacity of the inbound read buffer.
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            max_headers: MAX_HEADER_NUM,
            idle_timeout: Duration::from_secs(60),
            keep_alive: true,
            max_pipelined: 32,
            buffer_size: 8 * 1024,
        }
    }
}

impl Config {
    pub fn max_headers(&self) -> usize {
        self.max_headers.min(MAX_HEADER_NUM)
    }
}
