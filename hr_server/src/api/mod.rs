//! HTTP/WebSocket API for the hold'em server.
//!
//! Four routes, all unauthenticated except the password-gated reset:
//!
//! ```text
//! GET  /health          - Server health, room count, uptime
//! GET  /rooms           - Room roster with live seat counts
//! POST /reset           - Kick everyone and reinitialize all rooms
//! GET  /ws/{room_id}    - WebSocket session bound to one room
//! ```
//!
//! Game traffic never touches HTTP: it all flows over the WebSocket in
//! [`websocket`]. CORS is permissive so a browser lobby served from
//! anywhere can talk to the server.

pub mod websocket;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;

use holdem_rooms::room::{RoomCoordinator, RoomMeta};

use crate::config::ServerConfig;
use websocket::ConnectionRegistry;

/// Application state shared across HTTP handlers and WebSocket sessions.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RoomCoordinator,
    pub registry: ConnectionRegistry,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

/// Create the API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rooms", get(list_rooms))
        .route("/reset", post(reset_server))
        .route("/ws/{room_id}", get(websocket::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let rooms = state.coordinator.metas().await.len();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": rooms,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The room roster with live seat counts, sorted by room id.
async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomMeta>> {
    Json(state.coordinator.metas().await)
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    password: String,
}

/// Full server reset: kick every connection, then reinitialize every
/// room. Password-gated; the comparison is constant-time.
async fn reset_server(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    let supplied = request.password.as_bytes();
    let expected = state.config.reset_password.as_bytes();
    if !bool::from(supplied.ct_eq(expected)) {
        warn!("reset rejected: wrong password");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "wrong password"})),
        );
    }

    let kicked = state
        .registry
        .kick_all("server reset, please rejoin")
        .await;
    state
        .coordinator
        .reset_all(state.config.preserve_units)
        .await;
    info!("server reset complete, {kicked} connection(s) kicked");
    (StatusCode::OK, Json(json!({"success": true, "kicked": kicked})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::RoomDefaultsConfig;

    fn test_state() -> AppState {
        let config = ServerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            reset_password: "hunter2".to_string(),
            preserve_units: false,
            manual_rooms: 1,
            auto_rooms: 1,
            room_defaults: RoomDefaultsConfig {
                max_players: 20,
                small_blind: 5,
                big_blind: 10,
            },
        };
        let (coordinator, outbound) = RoomCoordinator::new(config.room_configs());
        let registry = ConnectionRegistry::default();
        tokio::spawn(websocket::relay_outbound(outbound, registry.clone()));
        AppState {
            coordinator,
            registry,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["rooms"], 2);
    }

    #[tokio::test]
    async fn test_rooms_endpoint_lists_roster() {
        let app = create_router(test_state());
        let request = Request::builder()
            .uri("/rooms")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let rooms: Vec<RoomMeta> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].name, "Room 1");
        assert!(!rooms[0].automated);
        assert_eq!(rooms[1].name, "Auto Room 1");
        assert!(rooms[1].automated);
    }

    #[tokio::test]
    async fn test_reset_requires_the_password() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/reset")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"password": "wrong"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_reset_with_the_password() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/reset")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"password": "hunter2"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_router(test_state());
        let request = Request::builder()
            .uri("/api/unknown")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_route_rejects_unknown_room() {
        let app = create_router(test_state());
        let request = Request::builder()
            .uri("/ws/room99")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
