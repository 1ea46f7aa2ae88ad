pub mod health;

#[cfg(test)]
mod tests;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use subtle::ConstantTimeEq;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;
use crate::errors::AppError;
use crate::orders::handlers as orders;
use crate::payments::handlers as payments;
use crate::state::AppState;

/// Upload ceiling for resume and revision files.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/orders", get(orders::handle_list_orders))
        .route("/orders/:id", get(orders::handle_get_order))
        .route("/orders/:id/file", get(orders::handle_download_file))
        .route("/orders/:id/revised", post(orders::handle_upload_revision))
        .route(
            "/orders/:id/send-revision",
            post(orders::handle_send_revision),
        )
        .route("/orders/:id/refund", post(orders::handle_refund))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/analyze", post(orders::handle_analyze))
        .route("/checkout", post(payments::handle_checkout))
        .route("/verify-session", post(payments::handle_verify_session))
        .route("/webhooks/stripe", post(payments::handle_stripe_webhook))
        .nest("/admin", admin)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bearer-token guard for `/admin/*`. Without a configured token the admin
/// surface is closed.
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(AppError::NotConfigured("Admin token"))?;

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if !token_matches(presented, expected) {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Constant-time over the token bytes; only the length can leak.
fn token_matches(presented: Option<&str>, expected: &str) -> bool {
    presented.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
}

/// `*` allows any origin without credentials; otherwise the exact list plus
/// the optional pattern, with credentials.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allows_any() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let cors = cors.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| {
                origin.to_str().is_ok_and(|o| cors.is_allowed(o))
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
