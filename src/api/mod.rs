//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and the two
//! WebSocket upgrade routes live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "fanout-gateway", description = "Real-time event fan-out gateway"),
    paths(
        handlers::system::health_handler,
        handlers::notifications::stats_handler,
        handlers::notifications::test_broadcast_handler,
        handlers::notifications::test_user_handler,
        handlers::notifications::test_group_handler,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        dto::StatsResponse,
        dto::TestBroadcastRequest,
        dto::TestUserRequest,
        dto::TestGroupRequest,
        dto::TestSendResponse,
        crate::domain::RegistryStats,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Notifications", description = "Channel statistics and operator test sends"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST, WebSocket, and middleware, bound to
/// `state`.
pub fn build_app(state: AppState) -> Router {
    let router = build_router().merge(ws::handler::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let Ok(response) = app.oneshot(request).await else {
            panic!("router call failed");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body read failed");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or_default();
        (status, value)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        let Ok(request) = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
        else {
            panic!("request should build");
        };
        request
    }

    fn get(uri: &str) -> Request<Body> {
        let Ok(request) = Request::get(uri).body(Body::empty()) else {
            panic!("request should build");
        };
        request
    }

    #[test]
    fn openapi_lists_notification_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/notifications/stats"));
        assert!(doc.paths.paths.contains_key("/health"));
    }

    #[tokio::test]
    async fn health_reports_connections() {
        let state = AppState::new(8);
        let (id, _rx) = state.general_hub.connect();
        state.general_hub.open(id);
        let (status, body) = call(build_app(state), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("connections").and_then(|v| v.as_u64()), Some(1));
    }

    #[tokio::test]
    async fn stats_defaults_to_general_and_rejects_unknown_channel() {
        let state = AppState::new(8);
        let (id, _rx) = state.topic_hub.connect();
        state.topic_hub.open(id);
        state.topic_hub.subscribe(id, "r1");

        let (status, body) = call(build_app(state.clone()), get("/api/v1/notifications/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("channel").and_then(|v| v.as_str()), Some("general"));
        assert_eq!(body.get("activeGroupCount").and_then(|v| v.as_u64()), Some(0));

        let (_, body) = call(
            build_app(state.clone()),
            get("/api/v1/notifications/stats?channel=topic"),
        )
        .await;
        assert_eq!(body.get("activeGroupCount").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(body.get("openConnections").and_then(|v| v.as_u64()), Some(1));

        let (status, body) =
            call(build_app(state), get("/api/v1/notifications/stats?channel=sms")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.pointer("/error/code").and_then(|v| v.as_u64()), Some(1002));
    }

    #[tokio::test]
    async fn test_user_requires_live_identity() {
        let state = AppState::new(8);
        let (status, body) = call(
            build_app(state.clone()),
            post_json(
                "/api/v1/notifications/test-user",
                serde_json::json!({ "userId": "ghost", "message": "hi" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.pointer("/error/code").and_then(|v| v.as_u64()), Some(2001));

        let (id, mut rx) = state.general_hub.connect();
        state.general_hub.open(id);
        state.general_hub.register_identity(id, "u1");
        let (status, _) = call(
            build_app(state),
            post_json(
                "/api/v1/notifications/test-user",
                serde_json::json!({ "userId": "u1", "message": "hi" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let Ok(push) = rx.try_recv() else {
            panic!("user should receive the test message");
        };
        assert_eq!(push.event, crate::routing::events::TEST_MESSAGE);
    }

    #[tokio::test]
    async fn test_group_reaches_general_topic_group_only() {
        let state = AppState::new(8);
        let (member, mut member_rx) = state.general_hub.connect();
        let (other, mut other_rx) = state.general_hub.connect();
        state.general_hub.open(member);
        state.general_hub.open(other);
        state.general_hub.subscribe(member, "r1");

        let (status, body) = call(
            build_app(state),
            post_json(
                "/api/v1/notifications/test-group",
                serde_json::json!({ "topicId": "r1", "message": "hello" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("delivered").and_then(|v| v.as_u64()), Some(1));
        assert!(member_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_broadcast_is_invalid() {
        let (status, body) = call(
            build_app(AppState::new(8)),
            post_json(
                "/api/v1/notifications/test-broadcast",
                serde_json::json!({ "message": "" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.pointer("/error/code").and_then(|v| v.as_u64()), Some(1001));
    }
}
