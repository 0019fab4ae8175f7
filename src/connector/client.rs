//! Client connector: sequential request/response exchanges over one
//! connection.

use std::fmt::Display;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{header, Method, Request, Response, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::connector::Config;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead, SendError};

/// Client role over any transport pair.
///
/// Exchanges are strictly sequential: `send` writes the whole request, then
/// reads and aggregates the whole response before returning. Once the peer
/// signals close (header, HTTP/1.0 default, or a close-delimited entity) the
/// connection refuses further sends.
pub struct ClientConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
    config: Config,
    open: bool,
}

impl<R, W> ClientConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, Config::default())
    }

    pub fn with_config(reader: R, writer: W, config: Config) -> Self {
        let decoder = ResponseDecoder::with_limits(config.max_head_bytes, config.max_headers());
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, config.buffer_size),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            config,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Performs one exchange: writes `request`, reads the response, and
    /// aggregates its entity. Chunked trailers are merged into the response
    /// headers. Truncated responses fail with [`ParseError::TruncatedEntity`].
    pub async fn send<B>(&mut self, request: Request<B>) -> Result<Response<Bytes>, HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        if !self.open {
            return Err(SendError::io(io::Error::from(io::ErrorKind::NotConnected)).into());
        }

        let (parts, body) = request.into_parts();
        let head = RequestHead::from(Request::from_parts(parts, ()));
        let method = head.method().clone();
        let request_asks_close = !head.is_persistent();

        self.write_request(head, body).await?;

        self.framed_read.decoder_mut().prepare(method);
        let response = self.read_response().await?;

        if request_asks_close {
            self.open = false;
        }
        if !self.open {
            debug!("connection no longer usable after this exchange");
        }

        Ok(response)
    }

    async fn write_request<B>(&mut self, head: RequestHead, mut body: B) -> Result<(), HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let payload_size = match body.size_hint().exact() {
            Some(0) => PayloadSize::Empty,
            Some(n) => PayloadSize::Length(n),
            // unknown-size client entities are always chunked
            None => PayloadSize::Chunked,
        };

        self.framed_write.feed(Message::<_, Bytes>::Header((head, payload_size))).await?;

        if !payload_size.is_empty() {
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
                        self.open = false;
                        return Err(SendError::invalid_body(format!("request body failed: {e}")).into());
                    }

                    None => {
                        self.framed_write.feed(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                        break;
                    }
                }
            }
        }

        self.framed_write.flush().await.map_err(|e| HttpError::from(SendError::from(e)))?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response<Bytes>, HttpError> {
        let mut response: Option<Response<()>> = None;
        let mut entity = BytesMut::new();

        loop {
            let next = timeout(self.config.idle_timeout, self.framed_read.next())
                .await
                .map_err(|_| HttpError::IdleTimeout { timeout_secs: self.config.idle_timeout.as_secs() })?;

            match next {
                Some(Ok(Message::Header((head, payload_size)))) => {
                    if payload_size.is_until_close() {
                        // the entity ends only when the peer closes
                        self.open = false;
                    }
                    response = Some(head);
                }

                Some(Ok(Message::Payload(PayloadItem::Chunk(data)))) => {
                    entity.extend_from_slice(&data);
                }

                Some(Ok(Message::Payload(PayloadItem::Trailers(trailers)))) => {
                    if let Some(head) = &mut response {
                        for (name, value) in &trailers {
                            head.headers_mut().append(name.clone(), value.clone());
                        }
                    }
                }

                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    let Some(head) = response else {
                        return Err(ParseError::invalid_body("entity finished before a response head").into());
                    };

                    if !response_is_persistent(&head) {
                        self.open = false;
                    }

                    let (parts, ()) = head.into_parts();
                    return Ok(Response::from_parts(parts, entity.freeze()));
                }

                Some(Err(e)) => {
                    self.open = false;
                    return Err(e.into());
                }

                None => {
                    self.open = false;
                    return Err(ParseError::io(io::Error::from(io::ErrorKind::UnexpectedEof)).into());
                }
            }
        }
    }
}

fn response_is_persistent(head: &Response<()>) -> bool {
    let close = connection_header_has(head, "close");
    match head.version() {
        Version::HTTP_11 => !close,
        Version::HTTP_10 => !close && connection_header_has(head, "keep-alive"),
        _ => false,
    }
}

fn connection_header_has(head: &Response<()>, token: &str) -> bool {
    head.headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

/// TCP dialer producing [`ClientConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct ClientConnector {
    config: Config,
}

impl ClientConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> io::Result<ClientConnection<OwnedReadHalf, OwnedWriteHalf>> {
        let stream = TcpStream::connect(addr).await?;
        if let Err(e) = stream.set_nodelay(true) {
            info!("could not disable nagle: {e}");
        }

        let (reader, writer) = stream.into_split();
        Ok(ClientConnection::with_config(reader, writer, self.config.clone()))
    }
}
