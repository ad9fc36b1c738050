//! Read-only JSON API over the integration facade.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;
use wfm_core::EntityKind;
use wfm_integration::{build_context, unified_search, ContextKind, Integration, IntegrationConfig};

pub const CRATE_NAME: &str = "wfm-web";

#[derive(Clone)]
pub struct AppState {
    pub integration: Integration,
}

impl AppState {
    pub fn new(integration: Integration) -> Self {
        Self { integration }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

impl SearchQuery {
    fn text(&self) -> &str {
        self.q.as_deref().unwrap_or("")
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/search", get(unified_search_handler))
        .route("/api/context/{kind}/{sp_id}", get(context_handler))
        .route("/api/{entity}", get(entity_search_handler))
        .route("/api/{entity}/{sp_id}", get(entity_get_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: &IntegrationConfig) -> anyhow::Result<()> {
    let integration = Integration::from_config(config)?;
    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(
        port = config.web_port,
        provider = integration.provider_name(),
        "serving staffing api"
    );
    axum::serve(listener, app(AppState::new(integration))).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "provider": state.integration.provider_name(),
    }))
    .into_response()
}

async fn entity_search_handler(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let Some(kind) = EntityKind::parse(&entity) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown entity {entity:?}"));
    };
    let integration = &state.integration;
    let q = query.text();
    match kind {
        EntityKind::Client => Json(integration.search_clients(q).await).into_response(),
        EntityKind::Worker => Json(integration.search_workers(q).await).into_response(),
        EntityKind::Site => Json(integration.search_sites(q).await).into_response(),
        EntityKind::Order => Json(integration.search_orders(q).await).into_response(),
        EntityKind::Replacement => Json(integration.search_replacements(q).await).into_response(),
        EntityKind::Relocation => Json(integration.search_relocations(q).await).into_response(),
    }
}

async fn entity_get_handler(
    State(state): State<Arc<AppState>>,
    Path((entity, sp_id)): Path<(String, String)>,
) -> Response {
    let Some(kind) = EntityKind::parse(&entity) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown entity {entity:?}"));
    };
    let Ok(sp_id) = sp_id.trim().parse::<i64>() else {
        return error_response(StatusCode::BAD_REQUEST, format!("invalid id {sp_id:?}"));
    };
    let integration = &state.integration;
    match kind {
        EntityKind::Client => found_or_404(kind, sp_id, integration.get_client(sp_id).await),
        EntityKind::Worker => found_or_404(kind, sp_id, integration.get_worker(sp_id).await),
        EntityKind::Site => found_or_404(kind, sp_id, integration.get_site(sp_id).await),
        EntityKind::Order => found_or_404(kind, sp_id, integration.get_order(sp_id).await),
        EntityKind::Replacement => {
            found_or_404(kind, sp_id, integration.get_replacement(sp_id).await)
        }
        EntityKind::Relocation => {
            found_or_404(kind, sp_id, integration.get_relocation(sp_id).await)
        }
    }
}

async fn context_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, sp_id)): Path<(String, String)>,
) -> Response {
    let Some(kind) = ContextKind::parse(&kind) else {
        return error_response(StatusCode::NOT_FOUND, format!("no context for {kind:?}"));
    };
    let Ok(sp_id) = sp_id.trim().parse::<i64>() else {
        return error_response(StatusCode::BAD_REQUEST, format!("invalid id {sp_id:?}"));
    };
    let context = build_context(&state.integration, kind, sp_id).await;
    let status = if context.is_missing() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    (status, Json(context)).into_response()
}

async fn unified_search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    Json(unified_search(&state.integration, query.text()).await).into_response()
}

fn found_or_404<T: serde::Serialize>(kind: EntityKind, sp_id: i64, found: Option<T>) -> Response {
    match found {
        Some(entity) => Json(entity).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("{} {} not found", kind.display_name(), sp_id),
        ),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
