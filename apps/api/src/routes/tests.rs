use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use super::build_router;
use crate::audit::QualityAuditor;
use crate::config::{Config, CorsConfig, StripeConfig};
use crate::delivery::tests::FakeNotifier;
use crate::extract::docx::MAX_DOCUMENT_XML_BYTES;
use crate::extract::tests::sample_pdf;
use crate::orders::models::{Order, OrderStatus, PaymentStatus};
use crate::orders::store::{MemoryOrderStore, OrderStore};
use crate::payments::tests::{price_book, FakeGateway};
use crate::payments::webhook::sign;
use crate::payments::{PaymentAdapter, SessionStatus};
use crate::state::AppState;
use crate::storage::{BlobStore, MemoryBlobStore};

const ADMIN_TOKEN: &str = "admin-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const BOUNDARY: &str = "----shortlist-test-boundary";
const RESUME: &str = "Jane Doe\nSenior Software Engineer\n8 years of experience building APIs";

fn test_config() -> Config {
    Config {
        port: 0,
        rust_log: "debug".into(),
        frontend_url: "https://app.example.com/".into(),
        upstream_timeout: Duration::from_secs(5),
        admin_token: Some(ADMIN_TOKEN.into()),
        database: None,
        llm: None,
        stripe: Some(StripeConfig {
            secret_key: "sk_test_123".into(),
            webhook_secret: Some(WEBHOOK_SECRET.into()),
            api_url: None,
        }),
        prices: price_book(),
        s3: None,
        smtp: None,
        cors: CorsConfig {
            origins: vec!["https://resumeshortlist.ai".into()],
            origin_pattern: None,
        },
    }
}

struct Harness {
    state: AppState,
    orders: Arc<MemoryOrderStore>,
    blobs: Arc<MemoryBlobStore>,
    gateway: Arc<FakeGateway>,
    notifier: Arc<FakeNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with(test_config(), FakeNotifier::default())
    }

    fn with(config: Config, notifier: FakeNotifier) -> Self {
        let orders = Arc::new(MemoryOrderStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(notifier);
        let state = AppState {
            payments: Some(PaymentAdapter::new(gateway.clone(), config.prices.clone())),
            config: Arc::new(config),
            orders: Some(orders.clone()),
            blobs: Some(blobs.clone()),
            notifier: Some(notifier.clone()),
            auditor: Arc::new(QualityAuditor::new(None)),
        };
        Self {
            state,
            orders,
            blobs,
            gateway,
            notifier,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    async fn order(&self, id: Uuid) -> Order {
        self.orders.find(id).await.unwrap()
    }

    /// Runs `/analyze` with a valid customer and returns the new order id.
    async fn analyze(&self) -> Uuid {
        let response = self
            .send(multipart_request(
                "/analyze",
                &[("name", "Jane Doe"), ("email", "jane@example.com")],
                Some(("resume.txt", RESUME.as_bytes())),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        Uuid::parse_str(body["upload_id"].as_str().unwrap()).unwrap()
    }

    async fn upload_revision(&self, id: Uuid) -> Response {
        self.send(multipart_request(
            &format!("/admin/orders/{id}/revised"),
            &[],
            Some(("Jane Doe revised.pdf", b"%PDF-1.4 revised")),
            Some(ADMIN_TOKEN),
        ))
        .await
    }

    /// Registers a paid session for `id` with the fake provider.
    fn pay(&self, id: Uuid, session_id: &str) {
        self.gateway.sessions.lock().unwrap().insert(
            session_id.to_string(),
            SessionStatus {
                id: session_id.to_string(),
                paid: true,
                email: Some("jane@example.com".into()),
                metadata: [("order_id".to_string(), id.to_string())].into(),
            },
        );
    }
}

fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
    token: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn error_code(response: Response) -> String {
    json_body(response).await["error"]["code"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_health_reports_dependencies() {
    let harness = Harness::new();
    let response = harness
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dependencies"]["order_store"], true);
    assert_eq!(body["dependencies"]["reasoning_service"], false);
}

#[tokio::test]
async fn test_analyze_persists_order() {
    let harness = Harness::new();
    let pdf = sample_pdf("Jane Doe Senior Software Engineer 8 years of experience");
    let response = harness
        .send(multipart_request(
            "/analyze",
            &[("name", "Jane Doe"), ("email", "jane@example.com")],
            Some(("resume.pdf", pdf.as_slice())),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let score = body["score"].as_u64().unwrap();
    assert!(score <= 100);
    assert!(["ENTRY", "MID", "SENIOR", "EXEC", "CSUITE"]
        .contains(&body["suggested_tier"].as_str().unwrap()));
    assert_eq!(body["bullet_recommendations"].as_array().unwrap().len(), 4);
    assert_eq!(body["gap_analysis"].as_array().unwrap().len(), 3);

    let id = Uuid::parse_str(body["upload_id"].as_str().unwrap()).unwrap();
    let order = harness.order(id).await;
    assert_eq!(order.status, OrderStatus::AnalysisComplete);
    assert_eq!(order.customer.email, "jane@example.com");
    assert_eq!(order.filename, "resume.pdf");
    let key = order.original_file_ref.unwrap();
    let stored = harness.blobs.get(&key).await.unwrap();
    assert_eq!(stored.bytes.as_ref(), pdf.as_slice());
    assert_eq!(stored.content_type, "application/pdf");
}

#[tokio::test]
async fn test_analyze_rejects_bad_customer_fields() {
    let harness = Harness::new();
    for fields in [
        [("name", "Jane"), ("email", "jane@example.com")],
        [("name", "Jane Doe"), ("email", "jane@example")],
    ] {
        let response = harness
            .send(multipart_request(
                "/analyze",
                &fields,
                Some(("resume.txt", RESUME.as_bytes())),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }
    assert!(harness.orders.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_unreadable_pdf_has_no_text() {
    let harness = Harness::new();
    let response = harness
        .send(multipart_request(
            "/analyze",
            &[("name", "Jane Doe"), ("email", "jane@example.com")],
            Some(("resume.pdf", b"definitely not a pdf")),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("No extractable text"));
}

#[tokio::test]
async fn test_analyze_rejects_docx_that_inflates_too_far() {
    use std::io::Write;

    let xml = format!(
        "<w:document><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
        "a".repeat(MAX_DOCUMENT_XML_BYTES as usize + 1)
    );
    let mut docx = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut docx));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    let harness = Harness::new();
    let response = harness
        .send(multipart_request(
            "/analyze",
            &[("name", "Jane Doe"), ("email", "jane@example.com")],
            Some(("resume.docx", docx.as_slice())),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"]["message"]
        .as_str()
        .unwrap()
        .contains("No extractable text"));
    assert!(harness.orders.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_unknown_price_makes_no_session() {
    let harness = Harness::new();
    let response = harness
        .send(json_request(
            "/checkout",
            serde_json::json!({"price_key": "MID", "include_interview_prep": false}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_checkout_missing_add_on_price_makes_no_session() {
    let mut config = test_config();
    config.prices.interview = None;
    let harness = Harness::with(config, FakeNotifier::default());
    let id = harness.analyze().await;

    let response = harness
        .send(json_request(
            "/checkout",
            serde_json::json!({
                "price_key": "SENIOR",
                "include_interview_prep": true,
                "upload_id": id.to_string(),
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.gateway.request_count(), 0);
    assert_eq!(harness.order(id).await.status, OrderStatus::AnalysisComplete);
}

#[tokio::test]
async fn test_checkout_starts_order() {
    let harness = Harness::new();
    let id = harness.analyze().await;

    let mut request = json_request(
        "/checkout",
        serde_json::json!({
            "price_key": "senior",
            "include_interview_prep": true,
            "upload_id": id.to_string(),
            "phone": "+1 555 0100",
        }),
    );
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://resumeshortlist.ai".parse().unwrap());
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["checkout_url"].as_str().unwrap().contains("cs_test_1"));

    let requests = harness.gateway.requests.lock().unwrap().clone();
    assert_eq!(requests[0].price_ids, vec!["price_senior", "price_interview"]);
    assert_eq!(
        requests[0].success_url,
        "https://resumeshortlist.ai/dashboard?session_id={CHECKOUT_SESSION_ID}"
    );
    assert_eq!(requests[0].metadata["order_id"], id.to_string());

    let order = harness.order(id).await;
    assert_eq!(order.status, OrderStatus::CheckoutStarted);
    assert!(order.interview_prep);
    assert_eq!(order.customer.phone.as_deref(), Some("+1 555 0100"));
    assert_eq!(
        order.payment.map(|p| (p.session_id, p.status)),
        Some(("cs_test_1".to_string(), PaymentStatus::Unpaid))
    );
}

#[tokio::test]
async fn test_checkout_unlisted_origin_uses_frontend_url() {
    let harness = Harness::new();
    let mut request = json_request("/checkout", serde_json::json!({"price_key": "ENTRY"}));
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://evil.example.com".parse().unwrap());
    assert_eq!(harness.send(request).await.status(), StatusCode::OK);

    let requests = harness.gateway.requests.lock().unwrap().clone();
    assert_eq!(requests[0].cancel_url, "https://app.example.com/results");
}

#[tokio::test]
async fn test_checkout_without_gateway_is_not_configured() {
    let mut harness = Harness::new();
    harness.state.payments = None;
    let response = harness
        .send(json_request("/checkout", serde_json::json!({"price_key": "ENTRY"})))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(response).await, "NOT_CONFIGURED");
}

#[tokio::test]
async fn test_verify_session_marks_paid_and_is_idempotent() {
    let harness = Harness::new();
    let id = harness.analyze().await;
    harness.pay(id, "cs_test_paid");

    let response = harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "paid");
    assert_eq!(body["email"], "jane@example.com");

    let paid = harness.order(id).await;
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(
        paid.payment.as_ref().map(|p| p.status),
        Some(PaymentStatus::Paid)
    );

    let again = harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;
    assert_eq!(json_body(again).await["status"], "paid");
    assert_eq!(harness.order(id).await.version, paid.version);
}

#[tokio::test]
async fn test_verify_session_rejects_malformed_id() {
    let harness = Harness::new();
    let response = harness
        .send(form_request("/verify-session", "session_id=not-a-session"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_after_payment_conflicts() {
    let harness = Harness::new();
    let id = harness.analyze().await;
    harness.pay(id, "cs_test_paid");
    harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;

    let response = harness
        .send(json_request(
            "/checkout",
            serde_json::json!({"price_key": "SENIOR", "upload_id": id.to_string()}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(harness.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_revision_then_delivery() {
    let harness = Harness::new();
    let id = harness.analyze().await;

    let early = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/send-revision")))
        .await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);
    let body = json_body(early).await;
    assert_eq!(body["error"]["message"], "revised resume not uploaded");

    let uploaded = harness.upload_revision(id).await;
    assert_eq!(uploaded.status(), StatusCode::OK);
    let summary = json_body(uploaded).await;
    assert_eq!(summary["status"], "revised_ready");
    assert_eq!(summary["has_revised"], true);
    assert!(summary.get("version").is_none());

    let unpaid = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/send-revision")))
        .await;
    assert_eq!(unpaid.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(harness.notifier.sent.lock().unwrap().is_empty());

    harness.pay(id, "cs_test_paid");
    harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;
    assert_eq!(harness.order(id).await.status, OrderStatus::RevisedReady);

    let sent = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/send-revision")))
        .await;
    assert_eq!(sent.status(), StatusCode::OK);
    assert_eq!(json_body(sent).await["status"], "delivered");

    let emails = harness.notifier.sent.lock().unwrap().clone();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "jane@example.com");
    assert_eq!(emails[0].filename, "Jane_Doe_revised.pdf");

    let order = harness.order(id).await;
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.delivered_at.is_some());

    let late = harness.upload_revision(id).await;
    assert_eq!(late.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_failed_email_marks_delivery_failed() {
    let harness = Harness::with(
        test_config(),
        FakeNotifier {
            fail: true,
            ..Default::default()
        },
    );
    let id = harness.analyze().await;
    harness.pay(id, "cs_test_paid");
    harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;
    harness.upload_revision(id).await;

    let response = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/send-revision")))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(response).await, "EMAIL_ERROR");
    assert_eq!(harness.order(id).await.status, OrderStatus::DeliveryFailed);
}

#[tokio::test]
async fn test_refund_requires_payment() {
    let harness = Harness::new();
    let id = harness.analyze().await;

    let unpaid = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/refund")))
        .await;
    assert_eq!(unpaid.status(), StatusCode::CONFLICT);

    harness.pay(id, "cs_test_paid");
    harness
        .send(form_request("/verify-session", "session_id=cs_test_paid"))
        .await;
    let refunded = harness
        .send(admin_request("POST", &format!("/admin/orders/{id}/refund")))
        .await;
    assert_eq!(refunded.status(), StatusCode::OK);
    assert_eq!(json_body(refunded).await["status"], "refunded");
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let harness = Harness::new();

    let anonymous = harness
        .send(Request::get("/admin/orders").body(Body::empty()).unwrap())
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = harness
        .send(
            Request::get("/admin/orders")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let same_length = harness
        .send(
            Request::get("/admin/orders")
                .header(header::AUTHORIZATION, "Bearer admin-secreT")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(same_length.status(), StatusCode::UNAUTHORIZED);

    let mut config = test_config();
    config.admin_token = None;
    let closed = Harness::with(config, FakeNotifier::default())
        .send(admin_request("GET", "/admin/orders"))
        .await;
    assert_eq!(closed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(closed).await, "NOT_CONFIGURED");
}

#[tokio::test]
async fn test_admin_list_and_download() {
    let harness = Harness::new();
    let first = harness.analyze().await;
    let second = harness.analyze().await;

    let listed = json_body(harness.send(admin_request("GET", "/admin/orders?limit=1")).await).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert!([first.to_string(), second.to_string()]
        .contains(&listed[0]["id"].as_str().unwrap().to_string()));

    let response = harness
        .send(admin_request(
            "GET",
            &format!("/admin/orders/{first}/file?file_type=original"),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"resume.txt\""
    );
    assert_eq!(body_bytes(response).await.as_ref(), RESUME.as_bytes());

    let missing = harness
        .send(admin_request(
            "GET",
            &format!("/admin/orders/{first}/file?file_type=revised"),
        ))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown = harness
        .send(admin_request("GET", &format!("/admin/orders/{}", Uuid::new_v4())))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

fn webhook_request(payload: &str, signature: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header(header::CONTENT_TYPE, "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_signed_webhook_confirms_payment() {
    let harness = Harness::new();
    let id = harness.analyze().await;
    let payload = serde_json::json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_hook",
            "payment_status": "paid",
            "metadata": {"order_id": id.to_string()}
        }}
    })
    .to_string();
    let now = chrono::Utc::now().timestamp();
    let signature = format!("t={now},v1={}", sign(WEBHOOK_SECRET, now, payload.as_bytes()));

    let response = harness.send(webhook_request(&payload, signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = harness.order(id).await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(
        order.payment.map(|p| p.session_id),
        Some("cs_test_hook".to_string())
    );

    let forged = harness
        .send(webhook_request(&payload, format!("t={now},v1={}", "ab".repeat(32))))
        .await;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_token_matches_exact_bytes_only() {
    assert!(super::token_matches(Some(ADMIN_TOKEN), ADMIN_TOKEN));
    assert!(!super::token_matches(Some("admin-secreT"), ADMIN_TOKEN));
    assert!(!super::token_matches(Some("admin-secret-longer"), ADMIN_TOKEN));
    assert!(!super::token_matches(Some(""), ADMIN_TOKEN));
    assert!(!super::token_matches(None, ADMIN_TOKEN));
}
