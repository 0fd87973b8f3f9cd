//! HTTP dispatcher (§4.G, §6): translates the REST surface into registry
//! lookups, correlation-engine calls, and confirmation-ledger operations.

mod dto;
mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::confirmation::ConfirmationLedger;
use crate::registry::Registry;

/// Shared state handed to every handler. Cheap to clone: both fields are
/// already reference-counted or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub confirmation: Arc<ConfirmationLedger>,
    pub started_at: Instant,
}

pub fn build_router(registry: Arc<Registry>, confirmation: Arc<ConfirmationLedger>) -> Router {
    let state = AppState {
        registry,
        confirmation,
        started_at: Instant::now(),
    };

    Router::new()
        .route("/servers", get(handlers::list_servers).post(handlers::create_server))
        .route("/servers/:id", delete(handlers::delete_server))
        .route("/servers/:id/tools", get(handlers::list_tools))
        .route("/servers/:id/tools/:name", post(handlers::call_tool))
        .route("/servers/:id/resources", get(handlers::list_resources))
        .route("/servers/:id/resources/:uri", get(handlers::read_resource))
        .route("/servers/:id/prompts", get(handlers::list_prompts))
        .route("/servers/:id/prompts/:name", post(handlers::get_prompt))
        .route("/confirmations/:handle", post(handlers::resolve_confirmation))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
