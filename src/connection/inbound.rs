//! Inbound way: the read half of a connection.
//!
//! Owns the read buffer and the parse progress for one direction. Exactly one
//! message is actively framed at a time: a head is parsed, its entity is
//! streamed (or drained), and only then does the next head parse begin, which
//! is what keeps pipelined requests aligned on message boundaries.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, error};

use crate::codec::RequestDecoder;
use crate::connector::Config;
use crate::protocol::body::{ReqBody, ReqBodySender};
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, RequestHead};

pub struct InboundWay<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    idle_timeout: Duration,
}

impl<R> InboundWay<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, config: &Config) -> Self {
        let decoder = RequestDecoder::with_limits(config.max_head_bytes, config.max_headers());
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, config.buffer_size),
            idle_timeout: config.idle_timeout,
        }
    }

    /// Reads the next request head, bounded by the idle timeout.
    ///
    /// `Ok(None)` is a clean close: the peer shut down between messages.
    /// A timeout between messages surfaces as [`HttpError::IdleTimeout`]; a
    /// timeout with a partial message buffered means the peer stalled
    /// mid-message and is a truncation.
    pub async fn next_head(&mut self) -> Result<Option<(RequestHead, PayloadSize)>, HttpError> {
        match timeout(self.idle_timeout, self.framed_read.next()).await {
            Ok(Some(Ok(Message::Header(head)))) => Ok(Some(head)),

            Ok(Some(Ok(Message::Payload(_)))) => {
                error!("entity item between messages, stream out of sync");
                Err(ParseError::invalid_body("expected a request head between messages").into())
            }

            Ok(Some(Err(e))) => Err(e.into()),

            Ok(None) => {
                debug!("peer closed between messages");
                Ok(None)
            }

            Err(_elapsed) => {
                if self.at_message_boundary() {
                    Err(HttpError::IdleTimeout { timeout_secs: self.idle_timeout.as_secs() })
                } else {
                    error!("peer stalled with a partial message buffered");
                    Err(ParseError::truncated(0).into())
                }
            }
        }
    }

    /// Creates the entity channel pair for the request just parsed.
    ///
    /// The returned sender borrows this way; the entity must be streamed and
    /// drained before the next head can be read.
    pub fn body_channel(&mut self) -> (ReqBody, ReqBodySender<'_, FramedRead<R, RequestDecoder>>) {
        ReqBody::channel(&mut self.framed_read)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn at_message_boundary(&self) -> bool {
        self.framed_read.read_buffer().is_empty() && !self.framed_read.decoder().is_decoding_payload()
    }
}
