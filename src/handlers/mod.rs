//! Request dispatch.
//!
//! Each request declares the authority it requires; the access interceptor
//! runs first, then the matching service operation. Every request gets
//! exactly one response event.

use crate::auth::{AuthService, BRIDGE_AUTHORITY};
use crate::error::AuthResult;
use crate::network::Connection;
use crate::network::protocol::{Request, RequestBody, ServerEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Authority a request requires. `None` means no check at all.
pub fn required_authority(body: &RequestBody) -> Option<i64> {
    match body {
        RequestBody::LoginPassword { .. }
        | RequestBody::LoginToken { .. }
        | RequestBody::LoginPlatform { .. }
        | RequestBody::Logout => None,
        RequestBody::DeleteToken { .. }
        | RequestBody::Unbind { .. }
        | RequestBody::UpdateProfile(_) => Some(1),
        RequestBody::PlatformMessage(_) => Some(BRIDGE_AUTHORITY),
    }
}

/// Run one request for `conn` and build its response.
#[instrument(skip_all, fields(conn = %conn.id(), id = request.id, kind = request.body.kind()))]
pub async fn dispatch(service: &AuthService, conn: &Arc<Connection>, request: Request) -> ServerEvent {
    let id = request.id;
    match handle(service, conn, request.body).await {
        Ok(body) => ServerEvent::ok(id, body),
        Err(e) => {
            if e.is_storage() {
                error!(error = %e, "Request failed");
            } else {
                debug!(error = %e, code = e.error_code(), "Request rejected");
            }
            ServerEvent::failure(id, e.client_message())
        }
    }
}

async fn handle(
    service: &AuthService,
    conn: &Arc<Connection>,
    body: RequestBody,
) -> AuthResult<Option<serde_json::Value>> {
    service.authorize(conn, required_authority(&body)).await?;

    match body {
        RequestBody::LoginPassword { name, password } => {
            service.login_with_password(conn, &name, &password).await?;
            Ok(None)
        }
        RequestBody::LoginToken { id, token } => {
            service.login_with_token(conn, id, &token).await?;
            Ok(None)
        }
        RequestBody::LoginPlatform { platform, pid } => {
            let challenge = service.request_platform_link(conn, &platform, &pid).await?;
            Ok(Some(json!({
                "code": challenge.code,
                "expiresAt": challenge.expires_at,
            })))
        }
        RequestBody::DeleteToken { serial } => {
            service.delete_token(conn, serial).await?;
            Ok(None)
        }
        RequestBody::Unbind { platform, pid } => {
            service.unbind(conn, &platform, &pid).await?;
            Ok(None)
        }
        RequestBody::UpdateProfile(patch) => {
            service.update_profile(conn, &patch).await?;
            Ok(None)
        }
        RequestBody::Logout => {
            service.logout(conn).await?;
            Ok(None)
        }
        RequestBody::PlatformMessage(message) => {
            let matched = service.route_platform_message(&message).await;
            Ok(Some(json!({ "matched": matched })))
        }
    }
}
