//! Kestrel proxy - account resource front end
//!
//! Routes `/{account}` requests to the account tier through an
//! [`AccountClient`](client::AccountClient), after the per-request context
//! and authorization hook have been checked.

pub mod account;
pub mod client;
pub mod context;
pub mod gatekeeper;

use axum::{
    Router, middleware,
    http::StatusCode,
    routing::get,
};
use client::AccountClient;
use context::{ProxyContext, context_layer};
use kestrel_common::config::ProxyConfig;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Account behavior switches
#[derive(Clone, Debug)]
pub struct AccountSettings {
    /// Allow PUT and DELETE on accounts
    pub allow_account_management: bool,
    /// Answer GET/HEAD on a missing account as if it were empty
    pub account_autocreate: bool,
    pub max_account_name_length: usize,
}

impl From<&ProxyConfig> for AccountSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            allow_account_management: config.allow_account_management,
            account_autocreate: config.account_autocreate,
            max_account_name_length: config.max_account_name_length,
        }
    }
}

/// Shared handler state
pub struct AppState {
    pub client: Arc<dyn AccountClient>,
    pub settings: AccountSettings,
}

/// Account routes without any middleware
pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/{account}",
        get(account::get_account)
            .head(account::head_account)
            .put(account::put_account)
            .post(account::post_account)
            .delete(account::delete_account),
    )
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Full application router.
///
/// Layers run outermost first: tracing, gatekeeper, context, handler.
/// `/health` sits outside the gatekeeper and context layers.
pub fn router(state: Arc<AppState>, context: ProxyContext) -> Router {
    let accounts = account_routes()
        .layer(middleware::from_fn_with_state(context, context_layer))
        .layer(middleware::from_fn(gatekeeper::gatekeeper_layer))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(accounts)
        .layer(TraceLayer::new_for_http())
}
