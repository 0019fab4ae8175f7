//! One HTTP/1.1 connection: an inbound way paired with an outbound way.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::connection::inbound::InboundWay;
use crate::connection::outbound::{ExchangeReply, OutboundItem, OutboundWay};
use crate::connector::Config;
use crate::handler::{BoxError, Handler};
use crate::protocol::{HttpError, ParseError};

/// Lifecycle of a connection. `Closing` covers the window where the read
/// side has finished but queued responses are still being flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Server-role connection over one transport.
///
/// Both ways are owned and mutated by the connection task alone; handler
/// tasks interact with it only through the concurrency-safe reply queue.
pub struct HttpConnection<R, W> {
    inbound: InboundWay<R>,
    outbound: OutboundWay<W>,
    config: Config,
    state: ConnectionState,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, Config::default())
    }

    pub fn with_config(reader: R, writer: W, config: Config) -> Self {
        Self {
            inbound: InboundWay::new(reader, &config),
            outbound: OutboundWay::new(writer),
            config,
            state: ConnectionState::Opening,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drives the connection until it closes: reads requests, dispatches them
    /// to `handler` on spawned tasks, and writes responses in request order.
    pub async fn process<H>(&mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + Send + Sync + 'static,
        H::RespBody: Body<Data = Bytes> + Send + 'static,
        <H::RespBody as Body>::Error: Into<BoxError>,
    {
        self.state = ConnectionState::Open;
        debug!(state = %self.state, "connection ready");

        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(self.config.max_pipelined));

        let config = self.config.clone();
        let state = &mut self.state;
        let inbound = &mut self.inbound;
        let outbound = &mut self.outbound;

        let inbound_task = async {
            let result = read_loop(inbound, handler, reply_tx, semaphore, config).await;
            // the read side is done; queued responses may still be flushing
            *state = ConnectionState::Closing;
            result
        };
        let outbound_task = outbound.run(reply_rx);

        let (inbound_result, outbound_result) = tokio::join!(inbound_task, outbound_task);

        self.state = ConnectionState::Closed;
        debug!(state = %self.state, "connection finished");

        inbound_result?;
        outbound_result
    }
}

/// The inbound side of `process`: one iteration per request exchange.
///
/// Dropping `reply_tx` on return is what lets the outbound way finish once
/// every dispatched handler has replied.
async fn read_loop<R, H>(
    inbound: &mut InboundWay<R>,
    handler: Arc<H>,
    reply_tx: UnboundedSender<(u64, OutboundItem)>,
    semaphore: Arc<Semaphore>,
    config: Config,
) -> Result<(), HttpError>
where
    R: AsyncRead + Unpin,
    H: Handler + Send + Sync + 'static,
    H::RespBody: Body<Data = Bytes> + Send + 'static,
    <H::RespBody as Body>::Error: Into<BoxError>,
{
    let mut serial: u64 = 0;

    loop {
        let head = match inbound.next_head().await {
            Ok(Some((head, _payload_size))) => head,

            Ok(None) => {
                debug!("read side finished, flushing pending responses");
                return Ok(());
            }

            Err(HttpError::IdleTimeout { timeout_secs }) => {
                info!(timeout_secs, "closing idle connection");
                return Ok(());
            }

            Err(HttpError::RequestError { source }) => {
                if source.is_truncation() || matches!(source, ParseError::Io { .. }) {
                    return Err(source.into());
                }
                // answer with a final 400 while the outbound way is intact
                error!("malformed request: {source}");
                let _ = reply_tx.send((
                    serial,
                    OutboundItem::Final(error_reply(StatusCode::BAD_REQUEST, Method::GET, Version::HTTP_11)),
                ));
                return Err(source.into());
            }

            Err(e) => return Err(e),
        };

        let persistent = config.keep_alive && head.is_persistent();
        let method = head.method().clone();
        let version = head.version();

        if head.expects_continue() {
            let mut interim = Response::new(());
            *interim.status_mut() = StatusCode::CONTINUE;
            let _ = reply_tx.send((serial, OutboundItem::Interim(interim)));
        }

        // bounds the number of dispatched-but-unanswered exchanges
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return Ok(());
        };

        let (req_body, mut body_sender) = inbound.body_channel();
        let (parts, ()) = head.into_inner().into_parts();
        let request = Request::from_parts(parts, req_body);

        let task_tx = reply_tx.clone();
        let task_handler = handler.clone();
        let task_method = method.clone();
        tokio::spawn(async move {
            let reply = match task_handler.call(request).await {
                Ok(response) => ExchangeReply {
                    response: response.map(|body| body.map_err(Into::into).boxed_unsync()),
                    method: task_method,
                    version,
                    persistent,
                },
                Err(e) => {
                    error!("request handler failed: {}", Into::<BoxError>::into(e));
                    let mut reply = error_reply(StatusCode::INTERNAL_SERVER_ERROR, task_method, version);
                    reply.persistent = persistent;
                    reply
                }
            };
            let _ = task_tx.send((serial, OutboundItem::Final(reply)));
            drop(permit);
        });

        // stream the entity to the handler, then drain whatever it left
        // unread so the next head parses from a message boundary
        let streamed = timeout(config.idle_timeout, async {
            body_sender.send_body().await?;
            body_sender.drain().await
        })
        .await;

        match streamed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                error!("peer stalled mid entity");
                return Err(ParseError::truncated(0).into());
            }
        }

        if !persistent {
            debug!("non-persistent exchange, reading stops");
            return Ok(());
        }

        serial += 1;
    }
}

fn error_reply(status: StatusCode, method: Method, version: Version) -> ExchangeReply {
    let mut response = Response::new(Empty::<Bytes>::new().map_err(Into::<BoxError>::into).boxed_unsync());
    *response.status_mut() = status;
    ExchangeReply { response, method, version, persistent: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::protocol::body::ReqBody;
    use http_body_util::Full;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn echo(req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path().to_string();
        if path == "/slow" {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let body = req.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();
        let payload = if body.is_empty() { Bytes::from(path) } else { body };
        Ok(Response::new(Full::new(payload)))
    }

    fn spawn_connection(server: DuplexStream) {
        let (reader, writer) = tokio::io::split(server);
        let mut connection = HttpConnection::new(reader, writer);
        tokio::spawn(async move {
            let _ = connection.process(Arc::new(handler_fn(echo))).await;
        });
    }

    async fn read_until_closed(client_read: &mut (impl AsyncReadExt + Unpin)) -> String {
        let mut wire = Vec::new();
        client_read.read_to_end(&mut wire).await.unwrap();
        String::from_utf8(wire).unwrap()
    }

    #[tokio::test]
    async fn serves_a_simple_exchange() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /hello HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 6\r\n"));
        assert!(wire.ends_with("/hello"));
    }

    #[tokio::test]
    async fn pipelined_responses_keep_request_order() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(
                b"GET /slow HTTP/1.1\r\nHost: h\r\n\r\nGET /second HTTP/1.1\r\nHost: h\r\n\r\nGET /third HTTP/1.1\r\nHost: h\r\n\r\n",
            )
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let wire = read_until_closed(&mut client_read).await;

        let slow_at = wire.find("/slow").unwrap();
        let second_at = wire.find("/second").unwrap();
        let third_at = wire.find("/third").unwrap();
        assert!(slow_at < second_at);
        assert!(second_at < third_at);
    }

    #[tokio::test]
    async fn connection_close_is_honored() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /bye HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await.unwrap();

        // no client shutdown: the server must close on its own
        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.contains("connection: close\r\n"));
        assert!(wire.ends_with("/bye"));
    }

    #[tokio::test]
    async fn http10_without_keep_alive_closes() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /old HTTP/1.0\r\nHost: h\r\n\r\n").await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.contains("connection: close\r\n"));
        assert!(wire.ends_with("/old"));
    }

    #[tokio::test]
    async fn expect_continue_gets_interim_response() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"POST /up HTTP/1.1\r\nHost: h\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\ndata")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        let continue_at = wire.find("HTTP/1.1 100 Continue\r\n\r\n").unwrap();
        let ok_at = wire.find("HTTP/1.1 200 OK\r\n").unwrap();
        assert!(continue_at < ok_at);
        assert!(wire.ends_with("data"));
    }

    #[tokio::test]
    async fn malformed_request_gets_bad_request() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(wire.contains("connection: close\r\n"));
    }

    #[tokio::test]
    async fn streaming_response_body_goes_out_chunked() {
        use http_body_util::StreamBody;

        type Frames = futures::stream::Iter<std::vec::IntoIter<Result<http_body::Frame<Bytes>, std::io::Error>>>;

        async fn stream_handler(_req: Request<ReqBody>) -> Result<Response<StreamBody<Frames>>, Infallible> {
            let frames = vec![
                Ok(http_body::Frame::data(Bytes::from_static(b"streamed "))),
                Ok(http_body::Frame::data(Bytes::from_static(b"bytes"))),
            ];
            Ok(Response::new(StreamBody::new(futures::stream::iter(frames))))
        }

        let (client, server) = tokio::io::duplex(16 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let mut connection = HttpConnection::new(reader, writer);
        tokio::spawn(async move {
            let _ = connection.process(Arc::new(handler_fn(stream_handler))).await;
        });

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /stream HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(wire.contains("9\r\nstreamed \r\n"));
        assert!(wire.contains("5\r\nbytes\r\n"));
        assert!(wire.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn connection_state_reaches_closed() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let mut connection = HttpConnection::new(reader, writer);
        assert_eq!(connection.state(), ConnectionState::Opening);

        let client_task = tokio::spawn(async move {
            let (mut client_read, mut client_write) = tokio::io::split(client);
            client_write.write_all(b"GET /done HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await.unwrap();
            read_until_closed(&mut client_read).await
        });

        connection.process(Arc::new(handler_fn(echo))).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Closed);

        let wire = client_task.await.unwrap();
        assert!(wire.ends_with("/done"));
    }

    #[tokio::test]
    async fn chunked_request_body_reaches_handler() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_connection(server);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"POST /chunks HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let wire = read_until_closed(&mut client_read).await;
        assert!(wire.ends_with("hello world"));
    }
}
