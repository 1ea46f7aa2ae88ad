use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Form, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::orders::intake::{validate_email, validate_name};
use crate::orders::lifecycle::{self, LifecycleError, OrderEvent};
use crate::orders::models::{Customer, Order, Tier};
use crate::orders::store::StoreError;
use crate::payments::webhook::{
    confirmed_session, parse_event, verify_signature, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use crate::payments::{AddOn, CheckoutMetadata, PaymentError, VerifiedStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub price_key: String,
    #[serde(default)]
    pub include_interview_prep: bool,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Redirect base for checkout: the caller's `Origin` when it is an allowed
/// origin, otherwise the configured frontend.
pub fn redirect_origin(headers: &HeaderMap, config: &Config) -> String {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|o| o.trim_end_matches('/'))
        .filter(|o| config.cors.is_allowed(o))
        .unwrap_or_else(|| config.frontend_url.trim_end_matches('/'))
        .to_string()
}

/// Customer for a checkout: request fields win, the order's stored contact
/// fills the gaps.
fn checkout_customer(body: &CheckoutBody, order: &Order) -> Result<Customer, AppError> {
    Ok(Customer {
        name: match non_empty(&body.name) {
            Some(name) => validate_name(name)?,
            None => order.customer.name.clone(),
        },
        email: match non_empty(&body.email) {
            Some(email) => validate_email(email)?,
            None => order.customer.email.clone(),
        },
        phone: non_empty(&body.phone)
            .map(str::to_string)
            .or_else(|| order.customer.phone.clone()),
    })
}

/// POST /checkout
pub async fn handle_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let payments = state.payments()?;

    let tier = Tier::parse_lenient(&body.price_key)
        .ok_or_else(|| PaymentError::UnknownTier(body.price_key.clone()))?;
    let add_ons: Vec<AddOn> = if body.include_interview_prep {
        vec![AddOn::InterviewPrep]
    } else {
        Vec::new()
    };
    // Every price must resolve before any order or gateway work.
    payments.line_items(tier, &add_ons)?;

    let order = match non_empty(&body.upload_id) {
        Some(raw) => {
            let id = Uuid::parse_str(raw)
                .map_err(|_| AppError::Validation(format!("upload_id '{raw}' is not valid")))?;
            Some(state.orders()?.find(id).await?)
        }
        None => None,
    };

    let customer = match &order {
        Some(order) => {
            let customer = checkout_customer(&body, order)?;
            // Fail fast on a paid or closed order before creating a session.
            lifecycle::plan(
                order,
                &OrderEvent::CheckoutStarted {
                    customer: customer.clone(),
                    session_id: String::new(),
                    interview_prep: body.include_interview_prep,
                },
            )?;
            Some(customer)
        }
        None => None,
    };

    let email = match (&customer, non_empty(&body.email)) {
        (Some(customer), _) => Some(customer.email.clone()),
        (None, Some(email)) => Some(validate_email(email)?),
        (None, None) => None,
    };

    let origin = redirect_origin(&headers, &state.config);
    let metadata = CheckoutMetadata {
        order_id: order.as_ref().map(|o| o.id),
        tier,
        email,
        interview_prep: body.include_interview_prep,
    };
    let session = payments
        .create_checkout(
            tier,
            &add_ons,
            format!("{origin}/dashboard?session_id={{CHECKOUT_SESSION_ID}}"),
            format!("{origin}/results"),
            &metadata,
        )
        .await?;

    if let (Some(order), Some(customer)) = (order, customer) {
        lifecycle::apply(
            state.orders()?,
            order.id,
            &OrderEvent::CheckoutStarted {
                customer,
                session_id: session.id.clone(),
                interview_prep: body.include_interview_prep,
            },
        )
        .await?;
    }

    Ok(Json(CheckoutResponse {
        checkout_url: session.url,
    }))
}

/// Marks the order behind a paid session as paid. An order id that no longer
/// resolves is logged and skipped so the provider-side result still reaches
/// the caller.
async fn confirm_order_payment(
    state: &AppState,
    order_id: Uuid,
    session_id: &str,
) -> Result<(), AppError> {
    let Some(store) = state.orders.as_deref() else {
        warn!("Order store not configured; payment for order {order_id} not recorded");
        return Ok(());
    };
    let event = OrderEvent::PaymentConfirmed {
        session_id: session_id.to_string(),
        paid_at: Utc::now(),
    };
    match lifecycle::apply(store, order_id, &event).await {
        Ok(order) => {
            info!("Order {order_id} is {} after session {session_id}", order.status);
            Ok(())
        }
        Err(LifecycleError::Store(StoreError::NotFound(_))) => {
            warn!("Paid session {session_id} references unknown order {order_id}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifySessionForm {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifySessionResponse {
    pub status: VerifiedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// POST /verify-session
pub async fn handle_verify_session(
    State(state): State<AppState>,
    Form(form): Form<VerifySessionForm>,
) -> Result<Json<VerifySessionResponse>, AppError> {
    if form.session_id.trim().is_empty() {
        return Err(AppError::Validation("session_id is required".into()));
    }
    let verification = state.payments()?.verify_payment(&form.session_id).await?;

    if verification.status == VerifiedStatus::Paid {
        match verification.order_id {
            Some(order_id) => {
                confirm_order_payment(&state, order_id, form.session_id.trim()).await?
            }
            None => info!("Paid session {} carries no order id", form.session_id),
        }
    }

    Ok(Json(VerifySessionResponse {
        status: verification.status,
        email: verification.email,
    }))
}

/// POST /webhooks/stripe
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .config
        .stripe
        .as_ref()
        .and_then(|s| s.webhook_secret.as_deref())
        .ok_or(AppError::NotConfigured("Stripe webhook secret"))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(
        &body,
        signature,
        secret,
        Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    )?;

    let event = parse_event(&body)?;
    match confirmed_session(&event)? {
        Some(session) => match session.order_id() {
            Some(order_id) => confirm_order_payment(&state, order_id, &session.id).await?,
            None => warn!(
                "Webhook {} ({}) carries no order id",
                event.id, event.event_type
            ),
        },
        None => info!("Webhook {} ({}) acknowledged", event.id, event.event_type),
    }

    Ok(Json(json!({ "received": true })))
}
