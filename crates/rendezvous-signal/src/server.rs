//! Signal server
//!
//! One listener carries both the WebSocket channels and the small JSON API:
//!
//! - `/ws/serve`, `/ws_serve`: operator channel, optional `claim=<token>`
//! - `/ws/connect`, `/ws_connect`: participant channel, `id=` or `room=`
//! - `/health`, `/api/health`: liveness and counters
//! - `/api/session/create`, `/api/create-session`: issue a pending token
//! - `/api/validate?token=`: claim check from the source address
//! - `POST /api/session/validate`: the same, from a form body

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method};
use axum::routing::{get, post};
use axum::Router;
use rendezvous_core::{normalize_token, Config, TokenGenerator};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::claim::ClaimService;
use crate::ws;

/// Longest token accepted when format checks are off
const MAX_TOKEN_LEN: usize = 64;

/// Settings the request handlers need
#[derive(Clone, Debug)]
pub struct ServerOptions {
    trust_forwarded_for: bool,
    strict_token_format: bool,
    generator: TokenGenerator,
    janitor_interval: Duration,
}

impl ServerOptions {
    pub fn new(config: &Config) -> Self {
        Self {
            trust_forwarded_for: config.server.trust_forwarded_for,
            strict_token_format: config.sessions.strict_token_format,
            generator: TokenGenerator::new(config.sessions.token_format),
            janitor_interval: config.relay.janitor_interval(),
        }
    }

    /// Canonical form of a presented token, or `None` if it is malformed
    pub fn accept_token(&self, raw: &str) -> Option<String> {
        let token = normalize_token(raw);
        let well_formed = if self.strict_token_format {
            self.generator.matches(&token)
        } else {
            !token.is_empty() && token.len() <= MAX_TOKEN_LEN
        };
        well_formed.then_some(token)
    }

    /// Source address for rate limiting
    pub fn client_ip(&self, headers: &HeaderMap, peer_addr: SocketAddr) -> IpAddr {
        if self.trust_forwarded_for {
            if let Some(ip) = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|xff| xff.split(',').next())
                .and_then(|first| first.trim().parse().ok())
            {
                return ip;
            }
        }
        peer_addr.ip()
    }
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub claims: Arc<ClaimService>,
    pub options: Arc<ServerOptions>,
}

/// Build the router for `state`
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/ws/serve", get(ws::ws_serve))
        .route("/ws_serve", get(ws::ws_serve))
        .route("/ws/connect", get(ws::ws_connect))
        .route("/ws_connect", get(ws::ws_connect))
        .route("/health", get(api::get_health))
        .route("/api/health", get(api::get_health))
        .route(
            "/api/session/create",
            get(api::create_session).post(api::create_session),
        )
        .route(
            "/api/create-session",
            get(api::create_session).post(api::create_session),
        )
        .route("/api/validate", get(api::get_validate))
        .route("/api/session/validate", post(api::post_session_validate))
        .fallback(api::not_found)
        .layer(cors)
        .with_state(state)
}

/// Signal server
pub struct SignalServer {
    state: AppState,
}

impl SignalServer {
    pub fn new(config: &Config) -> Self {
        Self {
            state: AppState {
                claims: Arc::new(ClaimService::new(config)),
                options: Arc::new(ServerOptions::new(config)),
            },
        }
    }

    pub fn claims(&self) -> &Arc<ClaimService> {
        &self.state.claims
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn serve(&self, addr: SocketAddr) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Serve an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> io::Result<()> {
        let janitor = self.spawn_janitor();
        let app = router(self.state.clone());

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;

        janitor.abort();
        result
    }

    fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        let claims = Arc::clone(&self.state.claims);
        let period = self.state.options.janitor_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let (pending, addresses) = claims.sweep();
                if pending > 0 || addresses > 0 {
                    info!(
                        "Janitor: purged {} pending sessions, {} limiter entries",
                        pending, addresses
                    );
                }
            }
        })
    }
}
