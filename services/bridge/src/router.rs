//! Axum Router Configuration

use crate::handlers;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Creates the HTTP router: a single liveness endpoint.
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let response = create_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = create_router()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
