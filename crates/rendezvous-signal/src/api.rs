//! JSON endpoints: token issuance and claim checks

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use serde_json::{json, Value};
use tracing::debug;

use crate::server::AppState;

// GET /health
pub async fn get_health(State(state): State<AppState>) -> Json<Value> {
    let rooms = state.claims.rooms();
    Json(json!({
        "status": "ok",
        "rooms": rooms.len(),
        "sessions": rooms.session_count(),
        "pending": state.claims.pending().len(),
    }))
}

// GET|POST /api/session/create
pub async fn create_session(State(state): State<AppState>) -> Json<Value> {
    let token = state.claims.create_pending_session();
    Json(json!({
        "token": token,
        "sessionId": token,
        "sessionCode": token,
        "roomId": token,
    }))
}

// GET /api/validate?token=
pub async fn get_validate(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    match non_empty(&params, "token") {
        Some(raw) => validate(&state, raw, &headers, peer_addr),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "token required"})),
        ),
    }
}

// POST /api/session/validate (form: token= or code=)
pub async fn post_session_validate(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    match non_empty(&params, "token").or_else(|| non_empty(&params, "code")) {
        Some(raw) => validate(&state, raw, &headers, peer_addr),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "token or code required"})),
        ),
    }
}

pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn validate(
    state: &AppState,
    raw: &str,
    headers: &HeaderMap,
    peer_addr: SocketAddr,
) -> (StatusCode, Json<Value>) {
    let ip = state.options.client_ip(headers, peer_addr);
    let valid = state
        .options
        .accept_token(raw)
        .filter(|token| state.claims.claim_if_valid(token, Some(ip)));

    match valid {
        Some(token) => (
            StatusCode::OK,
            Json(json!({"sessionId": token, "roomId": token, "valid": "true"})),
        ),
        None => {
            debug!("Claim check from {} rejected", ip);
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Session not found or expired"})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimService;
    use crate::server::{router, ServerOptions};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Method, Request};
    use axum::Router;
    use rendezvous_core::Config;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = Config::default();
        AppState {
            claims: Arc::new(ClaimService::new(&config)),
            options: Arc::new(ServerOptions::new(&config)),
        }
    }

    fn app(state: &AppState) -> Router {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 40000);
        router(state.clone()).layer(MockConnectInfo(peer))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_create_then_validate() {
        let state = state();

        let (status, body) = call(app(&state), get("/api/session/create")).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["roomId"], token.as_str());
        assert_eq!(body["sessionCode"], token.as_str());

        let (status, body) = call(app(&state), get(&format!("/api/validate?token={}", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], "true");
        assert_eq!(body["sessionId"], token.as_str());
    }

    #[tokio::test]
    async fn test_validate_errors() {
        let state = state();

        let (status, _) = call(app(&state), get("/api/validate")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(app(&state), get("/api/validate?token=000000")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found or expired");

        let (status, _) = call(app(&state), get("/api/session/validate")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_form_validate_falls_back_to_code() {
        let state = state();
        let token = state.claims.create_pending_session();

        let (status, body) = call(
            app(&state),
            post_form("/api/session/validate", format!("token=&code={}", token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roomId"], token.as_str());

        let (status, body) = call(
            app(&state),
            post_form("/api/session/validate", String::new()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "token or code required");
    }

    #[tokio::test]
    async fn test_validate_is_rate_limited_per_address() {
        let state = state();
        let token = state.claims.create_pending_session();

        for _ in 0..10 {
            let (status, _) = call(app(&state), get("/api/validate?token=12345678")).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        let (status, _) = call(app(&state), get(&format!("/api/validate?token={}", token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_unknown_path() {
        let state = state();
        state.claims.create_pending_session();

        let (status, body) = call(app(&state), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pending"], 1);
        assert_eq!(body["rooms"], 0);

        let (status, body) = call(app(&state), get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let state = state();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/session/create")
            .header(header::ORIGIN, "https://example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
