//! HTTP server implementation using Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, State},
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clawdbot_core::config::BotConfig;
use clawdbot_core::error::{BotError, Result};
use clawdbot_scheduler::{JobRunner, TriggerGate};
use clawdbot_services::SuggestionService;

use crate::ratelimit::RateLimiter;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: BotConfig,
    pub runner: Arc<JobRunner>,
    pub trigger: Arc<TriggerGate>,
    pub suggestions: Arc<SuggestionService>,
    pub limiter: Arc<RateLimiter>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: BotConfig,
        runner: Arc<JobRunner>,
        trigger: Arc<TriggerGate>,
        suggestions: Arc<SuggestionService>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.security.clone()));
        Self {
            config,
            runner,
            trigger,
            suggestions,
            limiter,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Peer address as seen by the listener, stashed for handlers that check
/// the IP allow-list.
#[derive(Clone)]
pub struct ClientIp(pub String);

/// Rate-limit middleware. Identity is the authenticated user id injected by
/// the marketplace's reverse proxy (`X-User-Id`), falling back to the peer
/// IP for anonymous traffic.
async fn rate_limit(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let peer_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    req.extensions_mut()
        .insert(ClientIp(peer_ip.clone().unwrap_or_else(|| "unknown".into())));

    let identity = req
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or(peer_ip)
        .unwrap_or_else(|| "anonymous".to_string());

    let decision = state.limiter.check(&identity, req.uri().path());
    if !decision.allowed {
        tracing::warn!("rate limited {identity} on {}", req.uri().path());
        return axum::response::Response::builder()
            .status(axum::http::StatusCode::TOO_MANY_REQUESTS)
            .header("Content-Type", "application/json")
            .header("Retry-After", decision.retry_after.to_string())
            .body(axum::body::Body::from(
                serde_json::json!({
                    "message": "Too many requests. Please slow down.",
                    "retry_after": decision.retry_after,
                })
                .to_string(),
            ))
            .unwrap_or_default();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    response
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/register", post(super::routes::register))
        .route("/api/v1/login", post(super::routes::login))
        .route("/api/v1/ai/price-suggestion", post(super::routes::ai_price_suggestion))
        .route("/api/v1/ai/generate-description", post(super::routes::ai_description))
        .route("/api/v1/ai/market-insights", post(super::routes::ai_market_insights))
        .route("/api/v1/bot/trigger", post(super::routes::bot_trigger))
        .route("/api/v1/bot/status", get(super::routes::bot_status))
        .route("/api/v1/analytics/query", post(super::routes::analytics_query))
        .layer(axum::middleware::from_fn_with_state(shared.clone(), rate_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve until the process exits.
pub async fn start(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BotError::Config(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("gateway listening on http://{addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(BotError::Io)?;
    Ok(())
}
