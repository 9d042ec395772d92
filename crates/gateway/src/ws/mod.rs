//! WebSocket endpoint: authentication, capacity admission, and handoff to
//! the per-connection session loop.
//!
//! Flow:
//! 1. Client connects to `/ws` with the API key in `X-API-Key` or the
//!    `api_key` query param.
//! 2. Wrong/missing key → close 4401 `authentication_failed`.
//! 3. No admission permit within the configured window → one
//!    `server_at_capacity` error frame, close 4503.
//! 4. Otherwise the session loop owns the socket until it ends; the permit
//!    is held for the connection's whole lifetime.

pub mod limits;
pub mod session;

use std::borrow::Cow;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use bn_domain::frame::ServerFrame;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// API key fallback for clients that cannot set headers.
    pub api_key: Option<String>,
}

/// Constant-time key comparison via SHA-256 digests. Hashing normalizes
/// lengths so `ct_eq` always compares 32 bytes.
fn key_matches(expected_hash: Option<&[u8]>, provided: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected_hash, provided) else {
        return false;
    };
    let provided_hash = Sha256::digest(provided.as_bytes());
    expected.ct_eq(provided_hash.as_slice()).into()
}

/// GET /ws — upgrade to WebSocket.
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.api_key);

    // The upgrade is always accepted so the client sees a proper WS close
    // code instead of a bare handshake failure.
    ws.on_upgrade(move |socket| handle_socket(socket, state, provided))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, provided_key: Option<String>) {
    if !key_matches(state.api_key_hash.as_deref(), provided_key.as_deref()) {
        tracing::warn!("websocket authentication failed");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 4401,
                reason: Cow::from("authentication_failed"),
            })))
            .await;
        return;
    }

    let admission_timeout = Duration::from_millis(state.config.server.admission_timeout_ms);
    let permit = match tokio::time::timeout(
        admission_timeout,
        state.admission.clone().acquire_owned(),
    )
    .await
    {
        Ok(Ok(permit)) => permit,
        _ => {
            tracing::warn!(
                capacity = state.config.server.max_concurrent_connections,
                "turning away connection at capacity"
            );
            let frame =
                ServerFrame::error("server_at_capacity", "server is at capacity; retry shortly");
            let _ = socket.send(Message::Text(frame.to_json())).await;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 4503,
                    reason: Cow::from("server_at_capacity"),
                })))
                .await;
            return;
        }
    };

    session::run(socket, state, permit).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(key: &str) -> Vec<u8> {
        Sha256::digest(key.as_bytes()).to_vec()
    }

    #[test]
    fn correct_key_matches() {
        let hash = hash_of("secret");
        assert!(key_matches(Some(&hash), Some("secret")));
    }

    #[test]
    fn wrong_key_rejected() {
        let hash = hash_of("secret");
        assert!(!key_matches(Some(&hash), Some("Secret")));
        assert!(!key_matches(Some(&hash), Some("")));
        assert!(!key_matches(Some(&hash), Some("secret2")));
    }

    #[test]
    fn missing_key_rejected() {
        let hash = hash_of("secret");
        assert!(!key_matches(Some(&hash), None));
    }

    #[test]
    fn unconfigured_server_rejects_everything() {
        assert!(!key_matches(None, Some("anything")));
        assert!(!key_matches(None, None));
    }
}
