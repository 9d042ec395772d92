//! HTTP router. The gateway exposes a single WebSocket endpoint; health
//! probing and TLS termination live in front of the process.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
