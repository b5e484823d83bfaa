//! HTTP route definitions.
//!
//! ```text
//! GET    /                                  service info
//! GET    /health                            pool health
//! POST   /api/sessions                      create session
//! DELETE /api/sessions/{id}                 close session
//! POST   /api/sessions/{id}/navigate        navigate
//! POST   /api/sessions/{id}/execute         evaluate script
//! GET    /api/sessions/{id}/content         page HTML
//! POST   /api/sessions/{id}/network         intercepted requests
//! DELETE /api/sessions/{id}/network         clear intercepted requests
//! POST   /api/sessions/{id}/wait            wait for selector
//! POST   /api/sessions/{id}/click           click element
//! POST   /api/sessions/{id}/type            type text
//! POST   /api/sessions/{id}/screenshot      screenshot (base64)
//! POST   /api/sessions/{id}/headers         merge extra headers
//! POST   /api/sessions/{id}/cookies         set cookies
//! GET    /api/sessions/{id}/cookies         get cookies
//! ```

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use relay_core::BrowserPool;

use crate::handlers;

pub fn router(pool: Arc<BrowserPool>) -> Router {
    Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/{session_id}", delete(handlers::close_session))
        .route("/api/sessions/{session_id}/navigate", post(handlers::navigate))
        .route("/api/sessions/{session_id}/execute", post(handlers::execute_script))
        .route("/api/sessions/{session_id}/content", get(handlers::page_content))
        .route(
            "/api/sessions/{session_id}/network",
            post(handlers::network_requests).delete(handlers::clear_network_requests),
        )
        .route("/api/sessions/{session_id}/wait", post(handlers::wait_for_element))
        .route("/api/sessions/{session_id}/click", post(handlers::click_element))
        .route("/api/sessions/{session_id}/type", post(handlers::type_text))
        .route("/api/sessions/{session_id}/screenshot", post(handlers::take_screenshot))
        .route("/api/sessions/{session_id}/headers", post(handlers::set_headers))
        .route(
            "/api/sessions/{session_id}/cookies",
            post(handlers::set_cookies).get(handlers::get_cookies),
        )
        .with_state(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use relay_core::fake::FakeLauncher;
    use relay_core::{PoolConfig, SessionOptions};
    use std::time::Duration;

    fn test_pool(max_sessions: usize) -> (Arc<BrowserPool>, Arc<FakeLauncher>) {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = Arc::new(BrowserPool::new(
            Arc::clone(&launcher) as Arc<dyn relay_core::CapabilityLauncher>,
            PoolConfig {
                max_sessions,
                session_timeout: Duration::from_secs(3600),
                ..PoolConfig::default()
            },
        ));
        (pool, launcher)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    #[tokio::test]
    async fn create_session_returns_an_id() {
        let (pool, _launcher) = test_pool(2);
        let app = router(pool);

        let response = app
            .oneshot(post_json("/api/sessions", json!({})))
            .await
            .expect("handler runs");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert!(!body["session_id"].as_str().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn exhausted_pool_maps_to_429() {
        let (pool, _launcher) = test_pool(1);
        let app = router(Arc::clone(&pool));

        pool.create_session(SessionOptions::default())
            .await
            .expect("first session");

        let response = app
            .oneshot(post_json("/api/sessions", json!({})))
            .await
            .expect("handler runs");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unknown_session_maps_to_404() {
        let (pool, _launcher) = test_pool(1);
        let app = router(pool);

        let response = app
            .oneshot(post_json(
                "/api/sessions/ghost/navigate",
                json!({ "url": "https://example.com" }),
            ))
            .await
            .expect("handler runs");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn closing_twice_maps_to_404_the_second_time() {
        let (pool, _launcher) = test_pool(1);
        let app = router(Arc::clone(&pool));

        let id = pool
            .create_session(SessionOptions::default())
            .await
            .expect("session");
        let uri = format!("/api/sessions/{id}");

        let delete_request = |uri: &str| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .expect("request builds")
        };

        let first = app
            .clone()
            .oneshot(delete_request(&uri))
            .await
            .expect("handler runs");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(delete_request(&uri)).await.expect("handler runs");
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn screenshot_payload_is_base64() {
        let (pool, _launcher) = test_pool(1);
        let app = router(Arc::clone(&pool));

        let id = pool
            .create_session(SessionOptions::default())
            .await
            .expect("session");

        let response = app
            .oneshot(post_json(
                &format!("/api/sessions/{id}/screenshot"),
                json!({ "full_page": false }),
            ))
            .await
            .expect("handler runs");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let image = body["image_data"].as_str().expect("image data present");
        let bytes = BASE64.decode(image).expect("valid base64");
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn headers_round_trip_additively() {
        let (pool, launcher) = test_pool(1);
        let app = router(Arc::clone(&pool));

        let id = pool
            .create_session(SessionOptions::default())
            .await
            .expect("session");
        let uri = format!("/api/sessions/{id}/headers");

        let first = app
            .clone()
            .oneshot(post_json(&uri, json!({ "headers": { "x-a": "1" } })))
            .await
            .expect("handler runs");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_json(&uri, json!({ "headers": { "x-b": "2" } })))
            .await
            .expect("handler runs");
        assert_eq!(second.status(), StatusCode::OK);

        let applied = launcher.last_capability().last_applied_headers();
        assert_eq!(applied.get("x-a").map(String::as_str), Some("1"));
        assert_eq!(applied.get("x-b").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn network_endpoint_returns_completed_records_only() {
        use relay_core::interceptor::{RequestEvent, ResponseEvent};
        use std::collections::HashMap;

        let (pool, _launcher) = test_pool(1);
        let app = router(Arc::clone(&pool));

        let id = pool
            .create_session(SessionOptions::default())
            .await
            .expect("session");
        let session = pool.get_session(&id).await.expect("session present");

        let interceptor = Arc::clone(session.interceptor());
        interceptor.record_request(RequestEvent {
            url: "https://a.test/api/data".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        });
        interceptor.record_request(RequestEvent {
            url: "https://a.test/api/pending".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        });
        interceptor.record_response(ResponseEvent {
            url: "https://a.test/api/data".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: Some(b"{\"ok\":true}".to_vec()),
        });

        let response = app
            .oneshot(post_json(&format!("/api/sessions/{id}/network"), json!({})))
            .await
            .expect("handler runs");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let requests = body["requests"].as_array().expect("requests array");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["status_code"], json!(200));
        assert_eq!(requests[0]["response_body"], json!("{\"ok\":true}"));
    }
}
