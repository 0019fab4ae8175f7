//! Server connector: accept loop that hands connections to the engine.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, warn};

use crate::connection::HttpConnection;
use crate::connector::Config;
use crate::handler::{BoxError, Handler};

/// Listens for TCP connections and runs one [`HttpConnection`] task per
/// accepted socket, all sharing one handler.
pub struct ServerConnector<H> {
    listener: TcpListener,
    handler: Arc<H>,
    config: Config,
}

impl<H> ServerConnector<H>
where
    H: Handler + Send + Sync + 'static,
    H::RespBody: Body<Data = Bytes> + Send + 'static,
    <H::RespBody as Body>::Error: Into<BoxError>,
{
    pub async fn bind<A: ToSocketAddrs>(addr: A, handler: H) -> io::Result<Self> {
        Self::bind_with_config(addr, handler, Config::default()).await
    }

    pub async fn bind_with_config<A: ToSocketAddrs>(addr: A, handler: H, config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handler: Arc::new(handler), config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever. Accept failures are logged and the loop
    /// keeps going; only binding problems abort the server.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr(), "server listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "connection accepted");

                    let (reader, writer) = stream.into_split();
                    let mut connection = HttpConnection::with_config(reader, writer, self.config.clone());
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = connection.process(handler).await {
                            warn!(%peer, "connection ended with error: {e}");
                        }
                    });
                }

                Err(e) => {
                    error!("accept failed: {e}");
                }
            }
        }
    }
}
