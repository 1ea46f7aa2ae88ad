use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditOutcome, GapFinding};
use crate::delivery::RevisionEmail;
use crate::errors::AppError;
use crate::extract::{extract_text_blocking, DocumentKind};
use crate::orders::intake::{customer_from, UploadForm};
use crate::orders::lifecycle::{self, check_deliverable, OrderEvent};
use crate::orders::models::{Order, OrderSummary, Tier};
use crate::state::AppState;
use crate::storage::{key_filename, object_key, FileKind};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub upload_id: Uuid,
    pub filename: String,
    pub score: u8,
    pub summary: String,
    pub suggested_tier: Tier,
    pub bullet_recommendations: Vec<String>,
    pub gap_analysis: Vec<GapFinding>,
}

/// POST /analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let customer = customer_from(form.field("name"), form.field("email"), form.field("phone"))?;
    let file = form.take_file()?;
    let store = state.orders()?;

    let text = extract_text_blocking(file.bytes.clone(), file.filename.clone()).await?;
    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "No extractable text found in the uploaded file".into(),
        ));
    }

    let outcome = state.auditor.audit(&text).await;
    if let AuditOutcome::Degraded { reason, .. } = &outcome {
        warn!("Audit for '{}' degraded to fallback: {reason}", file.filename);
    }
    let audit = outcome.into_audit();

    let id = Uuid::new_v4();
    let original_file_ref = match state.blobs.as_deref() {
        Some(blobs) => {
            let key = object_key(id, FileKind::Original, &file.filename);
            let content_type = DocumentKind::from_filename(&file.filename).content_type();
            blobs.put(&key, file.bytes, content_type).await?;
            Some(key)
        }
        None => {
            warn!("Blob storage not configured; order {id} keeps no original file");
            None
        }
    };

    let order = Order::new_analysed(id, customer, file.filename, audit, original_file_ref);
    store.create(&order).await?;
    info!(
        "Order {id} created: score={} tier={}",
        order.score, order.tier
    );

    Ok(Json(AnalyzeResponse {
        upload_id: order.id,
        filename: order.filename,
        score: order.audit.score,
        summary: order.audit.summary,
        suggested_tier: order.audit.suggested_tier,
        bullet_recommendations: order.audit.bullet_recommendations,
        gap_analysis: order.audit.gap_analysis,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /admin/orders
pub async fn handle_list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OrderSummary>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let orders = state.orders()?.list(limit).await?;
    Ok(Json(orders.into_iter().map(OrderSummary::from).collect()))
}

/// GET /admin/orders/:id
pub async fn handle_get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderSummary>, AppError> {
    let order = state.orders()?.find(id).await?;
    Ok(Json(order.into()))
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file_type: String,
}

/// GET /admin/orders/:id/file?file_type=original|revised
pub async fn handle_download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let kind = match query.file_type.as_str() {
        "original" => FileKind::Original,
        "revised" => FileKind::Revised,
        other => {
            return Err(AppError::Validation(format!(
                "file_type must be 'original' or 'revised', got '{other}'"
            )))
        }
    };

    let order = state.orders()?.find(id).await?;
    let key = match kind {
        FileKind::Original => order.original_file_ref,
        FileKind::Revised => order.revised_file_ref,
    }
    .ok_or_else(|| AppError::NotFound(format!("No {kind} file stored for order {id}")))?;

    let blob = state.blobs()?.get(&key).await?;
    let disposition = format!("attachment; filename=\"{}\"", key_filename(&key));

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.bytes,
    ))
}

/// POST /admin/orders/:id/revised
pub async fn handle_upload_revision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<OrderSummary>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    let store = state.orders()?;
    let blobs = state.blobs()?;

    // Reject before uploading anything for an order that can no longer change.
    let order = store.find(id).await?;
    let key = object_key(id, FileKind::Revised, &file.filename);
    lifecycle::plan(
        &order,
        &OrderEvent::RevisionAttached {
            file_ref: key.clone(),
        },
    )?;

    let content_type = DocumentKind::from_filename(&file.filename).content_type();
    blobs.put(&key, file.bytes, content_type).await?;

    let order = lifecycle::apply(store, id, &OrderEvent::RevisionAttached { file_ref: key }).await?;
    Ok(Json(order.into()))
}

/// POST /admin/orders/:id/send-revision
pub async fn handle_send_revision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderSummary>, AppError> {
    let store = state.orders()?;
    let order = store.find(id).await?;
    check_deliverable(&order)?;

    let notifier = state.notifier()?;
    let blobs = state.blobs()?;
    let key = order
        .revised_file_ref
        .as_deref()
        .ok_or(lifecycle::TransitionError::RevisionMissing)?;
    let blob = blobs.get(key).await?;

    let email = RevisionEmail {
        to: order.customer.email.clone(),
        name: order.customer.name.clone(),
        filename: key_filename(key).to_string(),
        content_type: blob.content_type,
        bytes: blob.bytes,
    };

    if let Err(e) = notifier.send_revision(&email).await {
        if let Err(mark_err) = lifecycle::apply(store, id, &OrderEvent::DeliveryFailed).await {
            error!("Order {id}: could not record failed delivery: {mark_err}");
        }
        return Err(e.into());
    }

    let order = lifecycle::apply(store, id, &OrderEvent::Delivered { at: Utc::now() }).await?;
    Ok(Json(order.into()))
}

/// POST /admin/orders/:id/refund
pub async fn handle_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderSummary>, AppError> {
    let order = lifecycle::apply(state.orders()?, id, &OrderEvent::Refunded).await?;
    Ok(Json(order.into()))
}
