//! API route handlers for the gateway.
//!
//! Identity arrives in `X-User-Id`/`X-User-Role` headers, injected by the
//! marketplace's reverse proxy after session validation. Handlers re-check
//! roles; the proxy is trusted for identity, not for authorization.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use clawdbot_core::auth::{Actor, Role, authorize};
use clawdbot_core::error::BotError;
use clawdbot_scheduler::TriggerRequest;
use clawdbot_services::AnalyticsRequest;

use super::server::{AppState, ClientIp};

/// JSON error envelope mapped from [`BotError`].
pub struct ApiError(pub BotError);

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self.0 {
            BotError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            BotError::Authorization => (StatusCode::FORBIDDEN, None),
            BotError::RateLimited { retry_after } => {
                (StatusCode::TOO_MANY_REQUESTS, Some(*retry_after))
            }
            BotError::OverlapSkipped(_) => (StatusCode::CONFLICT, None),
            BotError::Upstream(_) => (StatusCode::BAD_GATEWAY, None),
            BotError::Storage(_) | BotError::Config(_) | BotError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };
        let mut body = serde_json::json!({ "message": self.0.to_string() });
        if let Some(secs) = retry_after {
            body["retry_after"] = secs.into();
        }
        (status, Json(body)).into_response()
    }
}

/// Build an [`Actor`] from proxy-injected identity headers.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError(BotError::Validation("missing or invalid X-User-Id".into())))?;
    let role = headers
        .get("X-User-Role")
        .and_then(|v| v.to_str().ok())
        .map(Role::from_str)
        .transpose()?
        .unwrap_or(Role::User);
    Ok(Actor { id, role })
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "clawdbot-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Registration lives in the marketplace core. The route exists here so the
/// auth rate class covers it at the edge.
pub async fn register() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "message": "registration is handled by the marketplace core"
        })),
    )
}

pub async fn login() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "message": "login is handled by the marketplace core"
        })),
    )
}

#[derive(serde::Deserialize)]
pub struct PropertyRef {
    pub property_id: Uuid,
}

/// POST /api/v1/ai/price-suggestion — agents get an AI price for a listing.
pub async fn ai_price_suggestion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PropertyRef>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    authorize(actor.role, Role::Agent)?;

    let property = state
        .runner
        .properties
        .get(body.property_id)?
        .ok_or_else(|| BotError::Validation("unknown property".into()))?;
    let peers = state.runner.properties.all()?;
    let price = state
        .suggestions
        .suggest_price(&property, &peers, actor.id, &*state.runner.properties, &state.runner.audit)
        .await?;
    Ok(Json(serde_json::json!({
        "property_id": body.property_id,
        "suggested_price": price,
    })))
}

/// POST /api/v1/ai/generate-description — generate a listing description.
pub async fn ai_description(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PropertyRef>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    authorize(actor.role, Role::Agent)?;

    let property = state
        .runner
        .properties
        .get(body.property_id)?
        .ok_or_else(|| BotError::Validation("unknown property".into()))?;
    let text = state
        .suggestions
        .generate_description(&property, actor.id, &*state.runner.properties, &state.runner.audit)
        .await?;
    Ok(Json(serde_json::json!({
        "property_id": body.property_id,
        "description": text,
    })))
}

#[derive(serde::Deserialize)]
pub struct MarketQuery {
    pub category: String,
}

/// POST /api/v1/ai/market-insights — free-form market commentary.
pub async fn ai_market_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MarketQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    authorize(actor.role, Role::Agent)?;

    let text = state
        .suggestions
        .market_insights(&body.category, actor.id, &state.runner.audit)
        .await?;
    Ok(Json(serde_json::json!({
        "category": body.category,
        "insights": text,
    })))
}

/// POST /api/v1/bot/trigger — admin-only manual job trigger.
pub async fn bot_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(client_ip): Extension<ClientIp>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let allowlist = &state.config.security.ip_allowlist;
    if !allowlist.is_empty() && !allowlist.contains(&client_ip.0) {
        tracing::warn!("trigger refused for non-allowlisted ip {}", client_ip.0);
        return Err(ApiError(BotError::Authorization));
    }

    let actor = actor_from_headers(&headers)?;
    let outcome = state.trigger.trigger(&actor, &request).await?;
    Ok(Json(serde_json::json!({
        "command": outcome.command.name(),
        "status": outcome.status(),
        "preview": outcome.preview,
        "processed": outcome.processed,
        "affected": outcome.affected,
        "failures": outcome.failures,
        "duration_ms": outcome.duration_ms,
        "detail": outcome.detail,
    })))
}

/// GET /api/v1/bot/status — run history and queue depth, admin-only.
pub async fn bot_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    authorize(actor.role, Role::Admin)?;

    Ok(Json(serde_json::json!({
        "enabled": state.config.enabled,
        "scheduler_enabled": state.config.scheduler.enabled,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "queued_notifications": state.runner.notifications.queued_len(),
        "recent_runs": state.runner.audit.recent_runs(20)?,
        "recent_ai": state.runner.audit.recent_ai(20)?,
    })))
}

/// POST /api/v1/analytics/query — aggregated marketplace numbers.
pub async fn analytics_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AnalyticsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    authorize(actor.role, Role::Agent)?;

    let report = state.runner.analytics.query(
        &request,
        &*state.runner.properties,
        &*state.runner.enquiries,
        &state.runner.audit,
    )?;
    Ok(Json(serde_json::to_value(&report).unwrap_or_default()))
}
