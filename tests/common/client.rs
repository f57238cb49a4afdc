//! Test WebSocket client.
//!
//! Sends JSON requests and separates the two kinds of server traffic:
//! responses (matched by request id) and pushed session snapshots, which
//! are buffered until a test asks for them.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    sessions: VecDeque<Value>,
    errors: VecDeque<String>,
}

impl TestClient {
    /// Connect, optionally presenting an Origin header.
    ///
    /// Consumes the initial "no session" push.
    pub async fn connect(url: &str, origin: Option<&str>) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert(http::header::ORIGIN, http::HeaderValue::from_str(origin)?);
        }
        let (ws, _response) = connect_async(request).await?;

        let mut client = Self {
            ws,
            next_id: 1,
            sessions: VecDeque::new(),
            errors: VecDeque::new(),
        };
        let initial = client.next_session().await?;
        anyhow::ensure!(initial.is_null(), "expected empty initial session, got {initial}");
        Ok(client)
    }

    /// Send raw text.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a request of `kind` with `params` and wait for its response.
    pub async fn request(&mut self, kind: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut frame = params;
        let obj = frame
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("params must be a JSON object"))?;
        obj.insert("id".into(), json!(id));
        obj.insert("type".into(), json!(kind));
        self.send_raw(&frame.to_string()).await?;

        loop {
            let event = self.recv().await?;
            if event["type"] == "response" && event["id"] == id {
                return Ok(event);
            }
            self.stash(event)?;
        }
    }

    /// Like [`request`](Self::request) but fails unless the response is ok,
    /// returning its body.
    pub async fn request_ok(&mut self, kind: &str, params: Value) -> anyhow::Result<Value> {
        let response = self.request(kind, params).await?;
        anyhow::ensure!(response["ok"] == true, "{kind} failed: {response}");
        Ok(response.get("body").cloned().unwrap_or(Value::Null))
    }

    /// Like [`request`](Self::request) but fails unless the response is an
    /// error, returning its message.
    pub async fn request_err(&mut self, kind: &str, params: Value) -> anyhow::Result<String> {
        let response = self.request(kind, params).await?;
        anyhow::ensure!(response["ok"] == false, "{kind} unexpectedly succeeded: {response}");
        Ok(response["message"].as_str().unwrap_or_default().to_string())
    }

    /// Next pushed session body (`null` for "no session").
    pub async fn next_session(&mut self) -> anyhow::Result<Value> {
        if let Some(session) = self.sessions.pop_front() {
            return Ok(session);
        }
        loop {
            let event = self.recv().await?;
            if event["type"] == "session" {
                return Ok(event["body"].clone());
            }
            self.stash(event)?;
        }
    }

    /// Next unsolicited error event.
    pub async fn next_error(&mut self) -> anyhow::Result<String> {
        if let Some(message) = self.errors.pop_front() {
            return Ok(message);
        }
        loop {
            let event = self.recv().await?;
            if event["type"] == "error" {
                return Ok(event["message"].as_str().unwrap_or_default().to_string());
            }
            self.stash(event)?;
        }
    }

    /// Log in with the bootstrapped admin account and return the snapshot.
    pub async fn login_admin(&mut self) -> anyhow::Result<Value> {
        self.request_ok(
            "login/password",
            json!({"name": "admin", "password": "secret"}),
        )
        .await?;
        self.next_session().await
    }

    /// Close the connection.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn recv(&mut self) -> anyhow::Result<Value> {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            if let Message::Text(text) = frame {
                return Ok(serde_json::from_str(&text)?);
            }
        }
    }

    fn stash(&mut self, event: Value) -> anyhow::Result<()> {
        match event["type"].as_str() {
            Some("session") => self.sessions.push_back(event["body"].clone()),
            Some("error") => self
                .errors
                .push_back(event["message"].as_str().unwrap_or_default().to_string()),
            _ => anyhow::bail!("unexpected event: {event}"),
        }
        Ok(())
    }
}
