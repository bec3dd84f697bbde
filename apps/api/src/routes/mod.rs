pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::cv::handle_extract_cv;
use crate::email::handlers::handle_generate_email;
use crate::share::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_submission_bytes);
    let base_path = state.config.base_path.clone();

    let api = Router::new()
        .route("/health", get(health::health_handler))
        // Share API
        .route(
            "/api/v1/receivers/stream",
            get(handlers::handle_receiver_stream),
        )
        .route(
            "/api/v1/shares/:id/claim",
            post(handlers::handle_claim_share),
        )
        // Email API
        .route("/api/v1/email/generate", post(handle_generate_email))
        .route("/api/v1/cv/extract", post(handle_extract_cv));

    let router = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    };

    // The share target is matched by path suffix, so it lives in the fallback.
    router
        .fallback(handlers::handle_fallback)
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_at_root() {
        let response = build_router(AppState::for_tests())
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routes_mounted_under_base_path() {
        let state = AppState {
            config: Config {
                base_path: "/jobmail".to_string(),
                ..Config::default()
            },
            ..AppState::for_tests()
        };
        let app = build_router(state);

        let nested = app.clone().oneshot(get("/jobmail/health")).await.unwrap();
        assert_eq!(nested.status(), StatusCode::OK);

        let root = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(root.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_not_found() {
        let response = build_router(AppState::for_tests())
            .oneshot(get("/api/v1/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["code"], "NOT_FOUND");
    }
}
