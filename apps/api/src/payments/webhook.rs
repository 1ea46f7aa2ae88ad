//! Stripe webhook signature verification and event decoding.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! The signed payload is `"{t}.{raw body}"` under HMAC-SHA256 with the
//! endpoint secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::payments::stripe::StripeSession;
use crate::payments::SessionStatus;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingSignature,

    #[error("malformed Stripe-Signature header")]
    MalformedSignature,

    #[error("no signature matches the payload")]
    SignatureMismatch,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedSignature)?,
                )
            }
            // Non-hex v1 values can never match; skip them.
            "v1" => signatures.extend(hex::decode(value).ok()),
            _ => {}
        }
    }
    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(WebhookError::MalformedSignature),
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Hex signature for `payload` at `timestamp`, as Stripe would compute it.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    hex::encode(mac_for(secret, timestamp, payload).finalize().into_bytes())
}

/// Verifies the header against the raw request body. `now` is unix seconds.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let header = parse_header(header.ok_or(WebhookError::MissingSignature)?)?;

    let matched = header
        .signatures
        .iter()
        .any(|sig| mac_for(secret, header.timestamp, payload).verify_slice(sig).is_ok());
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }
    if (now - header.timestamp).abs() > tolerance_secs {
        return Err(WebhookError::TimestampOutOfTolerance);
    }
    Ok(())
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

/// The paid session an event confirms, if any. `checkout.session.completed`
/// only counts once the payment has settled; delayed methods settle later via
/// `checkout.session.async_payment_succeeded`.
pub fn confirmed_session(event: &WebhookEvent) -> Result<Option<SessionStatus>, WebhookError> {
    let settled_on_event = match event.event_type.as_str() {
        "checkout.session.completed" => false,
        "checkout.session.async_payment_succeeded" => true,
        _ => return Ok(None),
    };
    let session: StripeSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    if !settled_on_event && !session.is_paid() {
        return Ok(None);
    }
    let mut status = session.into_status();
    status.paid = true;
    Ok(Some(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        format!("t={timestamp},v1={}", sign(SECRET, timestamp, payload))
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let header = header_for(body, NOW);
        assert_eq!(
            verify_signature(body, Some(&header), SECRET, NOW + 10, DEFAULT_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let body = b"{}";
        let header = format!(
            "t={NOW},v1={},v0=ignored,v1={}",
            "00".repeat(32),
            sign(SECRET, NOW, body)
        );
        assert!(verify_signature(body, Some(&header), SECRET, NOW, 300).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let header = header_for(b"original", NOW);
        assert_eq!(
            verify_signature(b"tampered", Some(&header), SECRET, NOW, 300),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_old_timestamp_is_rejected() {
        let body = b"{}";
        let header = header_for(body, NOW - 301);
        assert_eq!(
            verify_signature(body, Some(&header), SECRET, NOW, 300),
            Err(WebhookError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_header_shapes() {
        assert_eq!(
            verify_signature(b"{}", None, SECRET, NOW, 300),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(b"{}", Some("v1=abcd"), SECRET, NOW, 300),
            Err(WebhookError::MalformedSignature)
        );
        assert_eq!(
            verify_signature(b"{}", Some("t=abc,v1=abcd"), SECRET, NOW, 300),
            Err(WebhookError::MalformedSignature)
        );
    }

    fn event(event_type: &str, payment_status: &str) -> WebhookEvent {
        let body = serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "data": {"object": {
                "id": "cs_test_1",
                "payment_status": payment_status,
                "customer_details": {"email": "jane@example.com"},
                "metadata": {"order_id": "6f1c1f1e-0000-4000-8000-000000000001"}
            }}
        });
        parse_event(body.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_completed_and_paid_confirms() {
        let session = confirmed_session(&event("checkout.session.completed", "paid"))
            .unwrap()
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert!(session.order_id().is_some());
        assert_eq!(session.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_completed_but_unpaid_waits() {
        let result = confirmed_session(&event("checkout.session.completed", "unpaid")).unwrap();
        assert!(result.is_none());
        let later = confirmed_session(&event("checkout.session.async_payment_succeeded", "unpaid"))
            .unwrap();
        assert!(later.is_some_and(|s| s.paid));
    }

    #[test]
    fn test_other_events_are_ignored() {
        assert!(confirmed_session(&event("invoice.paid", "paid"))
            .unwrap()
            .is_none());
    }
}
