use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, Stream, StreamExt};

use http_body::{Body, Frame};
use tracing::{debug, error};

use crate::protocol::{Message, ParseError, PayloadItem};

/// The consumer half of an inbound entity: an `http_body::Body` handed to the
/// request handler.
///
/// Entity bytes are pulled on demand from the inbound way through a channel
/// pair, so the handler can run on a worker task while the connection task
/// stays the only reader of the transport. Once drained, the entity cannot be
/// re-read. Chunked trailers arrive as `Frame::trailers`, which merges them
/// into the message's header set on aggregation.
pub struct ReqBody {
    signal: mpsc::Sender<oneshot::Sender<PayloadItem>>,
    receiving: Option<oneshot::Receiver<PayloadItem>>,
}

impl ReqBody {
    fn new(signal: mpsc::Sender<oneshot::Sender<PayloadItem>>) -> Self {
        Self { signal, receiving: None }
    }

    /// Creates the consumer/producer pair for one request's entity.
    ///
    /// The `ReqBody` goes to the handler; the `ReqBodySender` stays with the
    /// inbound way, which drives it until the entity is drained.
    pub fn channel<S>(payload_stream: &mut S) -> (ReqBody, ReqBodySender<'_, S>)
    where
        S: Stream + Unpin,
    {
        let (tx, receiver) = mpsc::channel(16);

        let req_body = ReqBody::new(tx);
        let body_sender = ReqBodySender { payload_stream, receiver, eof: false };

        (req_body, body_sender)
    }
}

/// The producer half: reads payload items from the inbound message stream and
/// forwards them to the `ReqBody` on request.
pub struct ReqBodySender<'conn, S>
where
    S: Stream + Unpin,
{
    payload_stream: &'conn mut S,
    receiver: mpsc::Receiver<oneshot::Sender<PayloadItem>>,
    eof: bool,
}

impl<S, T> ReqBodySender<'_, S>
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    /// Serves chunk requests from the handler until the entity reaches EOF or
    /// the handler drops its `ReqBody`.
    ///
    /// Returning is not the same as the entity being drained: `drain` must
    /// still run before the next pipelined head can be parsed.
    pub async fn send_body(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            let Some(sender) = self.receiver.next().await else {
                // handler dropped its body handle; the rest is skipped by drain()
                return Ok(());
            };

            match self.payload_stream.next().await {
                Some(Ok(Message::Payload(payload_item))) => {
                    if payload_item.is_eof() {
                        self.eof = true;
                    }
                    // handler may have gone away between signal and delivery
                    let _ = sender.send(payload_item);
                }

                Some(Ok(Message::Header(_))) => {
                    error!("received a message head while streaming an entity");
                    return Err(ParseError::invalid_body("received a message head while streaming an entity"));
                }

                Some(Err(e)) => return Err(e),

                None => {
                    error!("connection closed while streaming an entity");
                    return Err(ParseError::invalid_body("connection closed while streaming an entity"));
                }
            }
        }

        Ok(())
    }

    /// Discards any entity bytes the handler left unread.
    ///
    /// Keeps the inbound way at a clean message boundary so the next
    /// pipelined request parses from the right offset.
    pub async fn drain(&mut self) -> Result<(), ParseError> {
        if self.eof {
            return Ok(());
        }

        let mut skipped: usize = 0;
        loop {
            match self.payload_stream.next().await {
                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    self.eof = true;
                    if skipped > 0 {
                        debug!(skipped, "skipped unread request entity bytes");
                    }
                    return Ok(());
                }

                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    skipped += bytes.len();
                }

                Some(Ok(Message::Payload(PayloadItem::Trailers(_)))) => {
                    // trailers of an unread entity are dropped with it
                }

                Some(Ok(Message::Header(_))) => {
                    error!("received a message head while draining an entity");
                    return Err(ParseError::invalid_body("received a message head while draining an entity"));
                }

                Some(Err(e)) => return Err(e),

                None => {
                    error!("connection closed while draining an entity");
                    return Err(ParseError::invalid_body("connection closed while draining an entity"));
                }
            }
        }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        loop {
            if let Some(oneshot_receiver) = &mut self.receiving {
                return match ready!(oneshot_receiver.poll_unpin(cx)) {
                    Ok(PayloadItem::Chunk(bytes)) => {
                        self.receiving.take();
                        Poll::Ready(Some(Ok(Frame::data(bytes))))
                    }
                    Ok(PayloadItem::Trailers(trailers)) => {
                        self.receiving.take();
                        Poll::Ready(Some(Ok(Frame::trailers(trailers))))
                    }
                    Ok(PayloadItem::Eof) => {
                        self.receiving.take();
                        Poll::Ready(None)
                    }
                    Err(_) => {
                        self.receiving.take();
                        Poll::Ready(Some(Err(ParseError::invalid_body("entity streaming canceled"))))
                    }
                };
            }

            match ready!(self.signal.poll_ready(cx)) {
                Ok(()) => {
                    let (tx, rx) = oneshot::channel();
                    match self.signal.start_send(tx) {
                        Ok(()) => {
                            self.receiving = Some(rx);
                            continue;
                        }
                        Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
                    }
                }
                Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
            };
        }
    }
}
