use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::StripeConfig;
use crate::payments::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway, SessionStatus,
};

const STRIPE_API_URL: &str = "https://api.stripe.com";

/// Checkout session object as returned by the REST API and embedded in
/// webhook events. Only the fields this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl StripeSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    pub fn into_status(self) -> SessionStatus {
        SessionStatus {
            paid: self.is_paid(),
            email: self
                .customer_details
                .and_then(|d| d.email)
                .or(self.customer_email),
            metadata: self.metadata.unwrap_or_default(),
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

/// Stripe Checkout over the REST API: form-encoded requests, bearer auth.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, timeout: Duration) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| STRIPE_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];
        for (i, price) in request.price_ids.iter().enumerate() {
            form.push((format!("line_items[{i}][price]"), price.clone()));
            form.push((format!("line_items[{i}][quantity]"), "1".to_string()));
        }
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        form
    }

    async fn read_session(response: reqwest::Response) -> Result<StripeSession, PaymentError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            if status == StatusCode::NOT_FOUND {
                return Err(PaymentError::InvalidSession(message));
            }
            error!("Stripe returned {status}: {message}");
            return Err(PaymentError::Upstream(message));
        }

        serde_json::from_str(&body)
            .map_err(|e| PaymentError::Upstream(format!("unexpected session payload: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&Self::form(request))
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        let session = Self::read_session(response).await?;
        let url = session
            .url
            .ok_or_else(|| PaymentError::Upstream("checkout session has no url".to_string()))?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
        debug!("Retrieving checkout session {session_id}");
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        Ok(Self::read_session(response).await?.into_status())
    }
}
