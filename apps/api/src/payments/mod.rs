//! Payment Gateway Adapter.
//!
//! Resolves tiers and add-ons to provider price ids, creates hosted checkout
//! sessions and verifies their payment state. The checkout session metadata is
//! the only link between a payment and its order.

pub mod handlers;
pub mod stripe;
pub mod webhook;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::PriceBook;
use crate::orders::models::Tier;

const PRICE_ID_PREFIX: &str = "price_";
const SESSION_ID_PREFIX: &str = "cs_";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid price tier or missing price configuration for {0}")]
    UnknownTier(String),

    #[error("Interview prep selected but price not configured")]
    MissingAddOnPrice,

    #[error("Configured price identifier '{0}' is not a valid price id")]
    InvalidPriceIdentifier(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Payment provider error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOn {
    InterviewPrep,
}

/// Values attached to the checkout session and echoed back on confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub order_id: Option<Uuid>,
    pub tier: Tier,
    pub email: Option<String>,
    pub interview_prep: bool,
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(id) = self.order_id {
            map.insert("order_id".to_string(), id.to_string());
        }
        map.insert("tier".to_string(), self.tier.to_string());
        if let Some(email) = &self.email {
            map.insert("email".to_string(), email.clone());
        }
        map.insert(
            "interview_prep".to_string(),
            self.interview_prep.to_string(),
        );
        map
    }
}

/// Provider-agnostic checkout request: resolved price ids only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub price_ids: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Provider view of a checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub id: String,
    pub paid: bool,
    pub email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SessionStatus {
    /// Order id carried in metadata. Older sessions used `upload_id`.
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .or_else(|| self.metadata.get("upload_id"))
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedStatus {
    Paid,
    Unpaid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentVerification {
    pub status: VerifiedStatus,
    pub email: Option<String>,
    pub order_id: Option<Uuid>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentError>;
}

pub fn looks_like_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_ID_PREFIX).is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[derive(Clone)]
pub struct PaymentAdapter {
    gateway: Arc<dyn PaymentGateway>,
    prices: PriceBook,
}

impl PaymentAdapter {
    pub fn new(gateway: Arc<dyn PaymentGateway>, prices: PriceBook) -> Self {
        Self { gateway, prices }
    }

    pub fn price_for_tier(&self, tier: Tier) -> Result<&str, PaymentError> {
        let id = self
            .prices
            .tiers
            .get(&tier)
            .ok_or_else(|| PaymentError::UnknownTier(tier.to_string()))?;
        check_price_id(id)
    }

    pub fn price_for_add_on(&self, add_on: AddOn) -> Result<&str, PaymentError> {
        match add_on {
            AddOn::InterviewPrep => {
                let id = self
                    .prices
                    .interview
                    .as_deref()
                    .ok_or(PaymentError::MissingAddOnPrice)?;
                check_price_id(id)
            }
        }
    }

    /// Resolves every price before touching the gateway, so a missing add-on
    /// price never leaves a half-built session behind.
    pub fn line_items(&self, tier: Tier, add_ons: &[AddOn]) -> Result<Vec<String>, PaymentError> {
        let mut ids = vec![self.price_for_tier(tier)?.to_string()];
        for add_on in add_ons {
            ids.push(self.price_for_add_on(*add_on)?.to_string());
        }
        Ok(ids)
    }

    pub async fn create_checkout(
        &self,
        tier: Tier,
        add_ons: &[AddOn],
        success_url: String,
        cancel_url: String,
        metadata: &CheckoutMetadata,
    ) -> Result<CheckoutSession, PaymentError> {
        let request = CheckoutRequest {
            price_ids: self.line_items(tier, add_ons)?,
            success_url,
            cancel_url,
            customer_email: metadata.email.clone(),
            metadata: metadata.to_map(),
        };
        let session = self.gateway.create_checkout_session(&request).await?;
        info!(
            "Created checkout session {} for tier {tier} ({} line items)",
            session.id,
            request.price_ids.len()
        );
        Ok(session)
    }

    pub async fn verify_payment(&self, session_id: &str) -> Result<PaymentVerification, PaymentError> {
        let session_id = session_id.trim();
        if !looks_like_session_id(session_id) {
            return Err(PaymentError::InvalidSession(
                "malformed session id".to_string(),
            ));
        }
        let session = self.gateway.retrieve_session(session_id).await?;
        if !session.paid {
            return Ok(PaymentVerification {
                status: VerifiedStatus::Unpaid,
                email: None,
                order_id: session.order_id(),
            });
        }
        Ok(PaymentVerification {
            status: VerifiedStatus::Paid,
            order_id: session.order_id(),
            email: session
                .email
                .clone()
                .or_else(|| session.metadata.get("email").cloned()),
        })
    }
}

fn check_price_id(id: &str) -> Result<&str, PaymentError> {
    if id.starts_with(PRICE_ID_PREFIX) && id.len() > PRICE_ID_PREFIX.len() {
        Ok(id)
    } else {
        Err(PaymentError::InvalidPriceIdentifier(id.to_string()))
    }
}
