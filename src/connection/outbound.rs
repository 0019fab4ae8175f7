//! Outbound way: the write half of a connection.
//!
//! Handler tasks finish in whatever order they finish; the wire demands
//! responses in request order. Replies arrive here tagged with their exchange
//! serial and are held in a reorder buffer until every earlier exchange has
//! been fully written. The way is the sole writer of the transport.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::SinkExt;
use http::{header, HeaderValue, Method, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, warn};

use crate::codec::ResponseEncoder;
use crate::handler::BoxError;
use crate::protocol::{HttpError, Message, PayloadItem, PayloadSize, ResponseHead, SendError};

/// Response body type after erasure, shared by handler replies and
/// engine-generated error responses.
pub(crate) type OutboundBody = UnsyncBoxBody<Bytes, BoxError>;

/// One queue entry from a handler task or the connection task.
pub(crate) enum OutboundItem {
    /// Interim response (100 Continue), written before the exchange's final
    /// response and after every earlier exchange.
    Interim(ResponseHead),

    /// The exchange's final response.
    Final(ExchangeReply),
}

/// A final response plus the request-side facts normalization needs.
pub(crate) struct ExchangeReply {
    pub(crate) response: Response<OutboundBody>,
    pub(crate) method: Method,
    pub(crate) version: Version,
    pub(crate) persistent: bool,
}

#[derive(Default)]
struct Slot {
    interims: Vec<ResponseHead>,
    reply: Option<ExchangeReply>,
}

pub struct OutboundWay<W> {
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<W> OutboundWay<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { framed_write: FramedWrite::new(writer, ResponseEncoder::new()) }
    }

    /// Drains the reply queue until it closes or a non-persistent exchange
    /// finishes, writing responses strictly in serial order.
    pub(crate) async fn run(&mut self, mut queue: UnboundedReceiver<(u64, OutboundItem)>) -> Result<(), HttpError> {
        let mut next_serial: u64 = 0;
        let mut pending: BTreeMap<u64, Slot> = BTreeMap::new();

        while let Some((serial, item)) = queue.recv().await {
            let slot = pending.entry(serial).or_default();
            match item {
                OutboundItem::Interim(head) => slot.interims.push(head),
                OutboundItem::Final(reply) => slot.reply = Some(reply),
            }

            if !self.write_ready(&mut pending, &mut next_serial).await? {
                debug!(last_serial = next_serial, "closing connection after non-persistent exchange");
                queue.close();
                self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
                return Ok(());
            }
        }

        // producers are gone; anything still buffered is an exchange that was
        // dispatched but never answered
        if !pending.is_empty() {
            warn!(undelivered = pending.len(), "dropping responses for unanswered exchanges");
        }

        self.framed_write.flush().await.map_err(|e| HttpError::from(SendError::from(e)))?;
        Ok(())
    }

    /// Writes every contiguous completed exchange starting at `next_serial`.
    /// Returns `false` when a non-persistent exchange was flushed.
    async fn write_ready(&mut self, pending: &mut BTreeMap<u64, Slot>, next_serial: &mut u64) -> Result<bool, HttpError> {
        loop {
            let Some(slot) = pending.get_mut(next_serial) else { return Ok(true) };

            for interim in slot.interims.drain(..) {
                // flushed eagerly, the peer is blocked on it
                self.framed_write.send(Message::<_, Bytes>::Header((interim, PayloadSize::Empty))).await?;
            }

            let Some(reply) = slot.reply.take() else { return Ok(true) };
            pending.remove(next_serial);

            let persistent = self.write_response(reply).await?;
            *next_serial += 1;

            if !persistent {
                return Ok(false);
            }
        }
    }

    /// Normalizes and serializes one final response, streaming its body.
    /// Returns whether the connection stays persistent afterwards.
    async fn write_response(&mut self, reply: ExchangeReply) -> Result<bool, HttpError> {
        let Normalized { mut head, payload_size, body, persistent } = normalize(reply);

        if !persistent {
            head.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        self.framed_write.feed(Message::<_, Bytes>::Header((head, payload_size))).await?;

        if let Some(mut body) = body {
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        let item = match frame.into_data() {
                            Ok(data) => PayloadItem::Chunk(data),
                            Err(frame) => match frame.into_trailers() {
                                Ok(trailers) => PayloadItem::Trailers(trailers),
                                Err(_) => continue,
                            },
                        };
                        self.framed_write.feed(Message::Payload(item)).await?;
                    }

                    Some(Err(e)) => {
                        error!("response body failed: {e}");
                        return Err(SendError::invalid_body(format!("response body failed: {e}")).into());
                    }

                    None => {
                        self.framed_write.feed(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                        break;
                    }
                }
            }
        }

        self.framed_write.flush().await.map_err(|e| HttpError::from(SendError::from(e)))?;
        Ok(persistent)
    }
}

struct Normalized {
    head: ResponseHead,
    payload_size: PayloadSize,
    body: Option<OutboundBody>,
    persistent: bool,
}

/// Applies the response normalization policy before serialization.
///
/// Entity suppression rules, in order: HEAD keeps the computed entity headers
/// but emits no body; 204 drops a stray entity quietly; 205 and 304 and 1xx
/// drop it with a warning (304 keeps its entity headers). For the rest the
/// framing follows the body's size hint: exact size means `Content-Length`,
/// unknown size means chunked for an HTTP/1.1 peer and close-delimited for an
/// HTTP/1.0 peer, which forces the connection closed.
fn normalize(reply: ExchangeReply) -> Normalized {
    let ExchangeReply { response, method, version, persistent } = reply;
    let (parts, body) = response.into_parts();
    let mut head = Response::from_parts(parts, ());
    let status = head.status();

    let exact_size = body.size_hint().exact();
    let has_entity = exact_size != Some(0);

    let persistent = persistent && !wants_close(&head);

    if method == Method::HEAD {
        // the entity length is advertised even though no body bytes follow
        if let Some(n) = exact_size {
            if n > 0 && !head.headers().contains_key(header::CONTENT_LENGTH) {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
        }
        return Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent };
    }

    if status.is_informational() {
        if has_entity {
            warn!(%status, "interim response carried an entity, dropping it");
        }
        return Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent };
    }

    if status == StatusCode::NO_CONTENT {
        if has_entity {
            debug!("204 response carried an entity, dropping it");
        }
        return Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent };
    }

    if status == StatusCode::RESET_CONTENT {
        if has_entity {
            warn!("205 response carried an entity, dropping it");
        }
        return Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent };
    }

    if status == StatusCode::NOT_MODIFIED {
        if has_entity {
            warn!("304 response carried an entity, dropping it");
        }
        return Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent };
    }

    if status == StatusCode::OK && method == Method::GET && !has_entity {
        // advisory only, an empty 200 is unusual but legal
        warn!("200 response to a GET request carries no entity");
    }

    match exact_size {
        Some(0) => Normalized { head, payload_size: PayloadSize::Empty, body: None, persistent },
        Some(n) => Normalized { head, payload_size: PayloadSize::Length(n), body: Some(body), persistent },
        None if version == Version::HTTP_10 => {
            // an HTTP/1.0 peer cannot parse chunked, delimit by close
            Normalized { head, payload_size: PayloadSize::UntilClose, body: Some(body), persistent: false }
        }
        None => Normalized { head, payload_size: PayloadSize::Chunked, body: Some(body), persistent },
    }
}

/// True when the response itself asks for the connection to close.
fn wants_close(head: &ResponseHead) -> bool {
    head.headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}
