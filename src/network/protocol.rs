//! JSON wire format.
//!
//! Every client frame is a [`Request`]: a numeric correlation id plus a
//! `type`-tagged body. The server answers each request with exactly one
//! [`ServerEvent::Response`] carrying the same id, and pushes
//! [`ServerEvent::Session`] whenever the connection's session changes.

use crate::auth::Snapshot;
use serde::{Deserialize, Serialize};

/// A client request frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RequestBody {
    #[serde(rename = "login/password")]
    LoginPassword { name: String, password: String },
    #[serde(rename = "login/token")]
    LoginToken { id: i64, token: String },
    #[serde(rename = "login/platform")]
    LoginPlatform { platform: String, pid: String },
    #[serde(rename = "user/delete-token")]
    DeleteToken { serial: i64 },
    #[serde(rename = "user/unbind")]
    Unbind { platform: String, pid: String },
    #[serde(rename = "user/update")]
    UpdateProfile(ProfilePatch),
    #[serde(rename = "user/logout")]
    Logout,
    #[serde(rename = "platform/message")]
    PlatformMessage(InboundMessage),
}

impl RequestBody {
    /// Wire name of the request, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoginPassword { .. } => "login/password",
            Self::LoginToken { .. } => "login/token",
            Self::LoginPlatform { .. } => "login/platform",
            Self::DeleteToken { .. } => "user/delete-token",
            Self::Unbind { .. } => "user/unbind",
            Self::UpdateProfile(_) => "user/update",
            Self::Logout => "user/logout",
            Self::PlatformMessage(_) => "platform/message",
        }
    }
}

/// Partial profile update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A message observed on an external platform, relayed by a bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub platform: String,
    pub pid: String,
    pub content: String,
    /// Display name of the sender on the platform, if the bridge knows it.
    #[serde(default)]
    pub name: Option<String>,
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Session {
        body: Option<Snapshot>,
    },
    Response {
        id: u64,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn ok(id: u64, body: Option<serde_json::Value>) -> Self {
        Self::Response {
            id,
            ok: true,
            body,
            message: None,
        }
    }

    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self::Response {
            id,
            ok: false,
            body: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
