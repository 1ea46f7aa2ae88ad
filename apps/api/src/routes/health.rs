use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service version and which external dependencies are configured.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let webhook_secret = state
        .config
        .stripe
        .as_ref()
        .is_some_and(|s| s.webhook_secret.is_some());

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "shortlist-api",
        "dependencies": {
            "order_store": state.orders.is_some(),
            "blob_store": state.blobs.is_some(),
            "reasoning_service": state.auditor.is_configured(),
            "payment_gateway": state.payments.is_some(),
            "webhook_secret": webhook_secret,
            "email": state.notifier.is_some(),
            "admin_token": state.config.admin_token.is_some(),
        }
    }))
}
