//! WebSocket server configuration and startup

use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use twap_core::{ServerConfig, TwapWindow};

use crate::publisher::{Publisher, Subscriber};

/// Upgrade rules checked during the handshake
#[derive(Debug, Clone)]
struct HandshakePolicy {
    path: String,
    allowed_origins: Vec<String>,
    timeout: Duration,
}

impl HandshakePolicy {
    fn from_config(config: &ServerConfig) -> Self {
        Self {
            path: config.path.clone(),
            allowed_origins: config.allowed_origins.clone(),
            timeout: config.handshake_timeout(),
        }
    }

    /// An empty allow-list accepts any origin
    fn check(&self, request: &Request) -> Result<(), ErrorResponse> {
        if request.uri().path() != self.path {
            return Err(reject(StatusCode::NOT_FOUND, "not found"));
        }

        if self.allowed_origins.is_empty() {
            return Ok(());
        }

        let origin = request
            .headers()
            .get("origin")
            .and_then(|value| value.to_str().ok());

        match origin {
            Some(origin) if self.allowed_origins.iter().any(|allowed| allowed == origin) => Ok(()),
            _ => Err(reject(StatusCode::FORBIDDEN, "origin not allowed")),
        }
    }
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

/// WebSocket server wrapper
pub struct WsServer {
    config: ServerConfig,
    publisher: Arc<Publisher>,
}

impl WsServer {
    pub fn new(config: ServerConfig, publisher: Publisher) -> Self {
        Self {
            config,
            publisher: Arc::new(publisher),
        }
    }

    /// Get server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr: SocketAddr = self.address().parse()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(listener)
    }

    /// Start the server with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` fires
    ///
    /// Every accepted connection gets its own task; the accept loop never
    /// waits on a subscriber.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        let policy = Arc::new(HandshakePolicy::from_config(&self.config));
        info!("Starting WebSocket server on ws://{}{}", local, self.config.path);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let publisher = self.publisher.clone();
                        let policy = policy.clone();
                        tokio::spawn(handle_connection(stream, peer, publisher, policy));
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                    }
                },
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("WebSocket server stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    publisher: Arc<Publisher>,
    policy: Arc<HandshakePolicy>,
) {
    let mut query = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        policy.check(request)?;
        query = request.uri().query().map(str::to_owned);
        Ok(response)
    };

    let ws = match tokio::time::timeout(policy.timeout, accept_hdr_async(stream, callback)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(%peer, "Handshake rejected: {}", e);
            return;
        }
        Err(_) => {
            debug!(%peer, timeout = ?policy.timeout, "Handshake timed out");
            return;
        }
    };

    let window = TwapWindow::from_query(query.as_deref());
    let (sink, mut incoming) = ws.split();
    let (disconnect_tx, disconnect_rx) = oneshot::channel();

    // Inbound frames are drained only to notice the close
    let reader = tokio::spawn(async move {
        while let Some(frame) = incoming.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(%peer, "Read failed: {}", e);
                    break;
                }
            }
        }
        let _ = disconnect_tx.send(());
    });

    let mut subscriber = Subscriber::new(window, sink);
    info!(%peer, subscriber = %subscriber.id(), window = window.secs(), "Subscriber connected");

    let reason = publisher.run(&mut subscriber, disconnect_rx).await;
    reader.abort();

    info!(%peer, subscriber = %subscriber.id(), ?reason, "Subscriber disconnected");
}
