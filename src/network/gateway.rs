//! Gateway - WebSocket listener that accepts console and bridge clients.
//!
//! Each accepted socket gets its own task. Requests on one connection are
//! handled strictly in order; outbound events are written by a separate
//! writer task draining the connection's queue.

use crate::auth::AuthService;
use crate::config::ListenConfig;
use crate::handlers;
use crate::network::Connection;
use crate::network::protocol::{Request, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    allow_origins: Arc<Vec<String>>,
    service: Arc<AuthService>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(config: &ListenConfig, service: Arc<AuthService>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");

        Ok(Self {
            listener,
            allow_origins: Arc::new(config.allow_origins.clone()),
            service,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "WebSocket connection attempt");
                    let allowed = Arc::clone(&self.allow_origins);
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        serve_connection(stream, addr, allowed, service).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

/// Whether a handshake with `origin` may proceed. An empty allow list
/// admits everything, including clients that send no Origin header.
fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    origin.is_some_and(|origin| allowed.iter().any(|a| a == origin || a == "*"))
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    allowed: Arc<Vec<String>>,
    service: Arc<AuthService>,
) {
    let mut user_agent = None;
    let cors_callback = |req: &http::Request<()>, response: http::Response<()>| {
        let headers = req.headers();
        user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let origin = headers.get(http::header::ORIGIN).and_then(|o| o.to_str().ok());
        if origin_allowed(&allowed, origin) {
            return Ok(response);
        }

        warn!(%addr, origin = origin.unwrap_or("-"), "WebSocket CORS rejected");
        let mut rejection = http::Response::new(Some("CORS origin not allowed".to_string()));
        *rejection.status_mut() = http::StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let ws_stream = match accept_hdr_async(stream, cors_callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (conn, mut outbound) = Connection::channel(OUTBOUND_CAPACITY, user_agent, Some(addr));
    info!(conn = %conn.id(), %addr, "Connection opened");

    let (mut sink, mut source) = ws_stream.split();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&*event) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to encode server event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    if let Err(e) = service.connection_opened(&conn).await {
        warn!(conn = %conn.id(), error = %e, "Failed to push initial session state");
    }

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<Request>(&text) {
                    Ok(request) => handlers::dispatch(&service, &conn, request).await,
                    Err(e) => {
                        debug!(conn = %conn.id(), error = %e, "Malformed request");
                        ServerEvent::error(format!("malformed request: {e}"))
                    }
                };
                if !conn.send(event).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %conn.id(), error = %e, "WebSocket read error");
                break;
            }
        }
    }

    service.connection_closed(&conn);
    info!(conn = %conn.id(), %addr, "Connection closed");

    drop(conn);
    if writer.await.is_err() {
        debug!(%addr, "Writer task ended abnormally");
    }
}
