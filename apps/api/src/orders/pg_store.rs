use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::audit::Audit;
use crate::orders::models::{Customer, Order, OrderPatch, Payment};
use crate::orders::store::{OrderStore, StoreError};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    status: String,
    tier: String,
    score: i16,
    audit: Json<Audit>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    filename: String,
    original_file_ref: Option<String>,
    revised_file_ref: Option<String>,
    payment_session_id: Option<String>,
    payment_status: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    interview_prep: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: row.id, reason };

        let payment = match (row.payment_session_id, row.payment_status.as_deref()) {
            (Some(session_id), Some(status)) => Some(Payment {
                session_id,
                status: status.parse().map_err(corrupt)?,
                paid_at: row.paid_at,
            }),
            _ => None,
        };

        Ok(Order {
            id: row.id,
            status: row.status.parse().map_err(corrupt)?,
            tier: row.tier.parse().map_err(corrupt)?,
            score: u8::try_from(row.score.clamp(0, 100)).unwrap_or(0),
            audit: row.audit.0,
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            filename: row.filename,
            original_file_ref: row.original_file_ref,
            revised_file_ref: row.revised_file_ref,
            payment,
            interview_prep: row.interview_prep,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
        })
    }
}

/// Postgres-backed order store. Each update is a single `UPDATE ... RETURNING`
/// that merges only the patched columns.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (id, status, tier, score, audit, customer_name, customer_email, customer_phone,
                 filename, original_file_ref, revised_file_ref, payment_session_id,
                 payment_status, paid_at, interview_prep, version, created_at, updated_at,
                 delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.tier.as_str())
        .bind(i16::from(order.score))
        .bind(Json(&order.audit))
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(&order.filename)
        .bind(&order.original_file_ref)
        .bind(&order.revised_file_ref)
        .bind(order.payment.as_ref().map(|p| p.session_id.as_str()))
        .bind(order.payment.as_ref().map(|p| p.status.as_str()))
        .bind(order.payment.as_ref().and_then(|p| p.paid_at))
        .bind(order.interview_prep)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId(order.id));
        }
        info!("Inserted order {}", order.id);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Order, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?
            .try_into()
    }

    async fn update(&self, id: Uuid, patch: &OrderPatch) -> Result<Order, StoreError> {
        // Customer and payment are replaced as a unit, so their optional
        // sub-fields follow the presence of the block rather than COALESCE.
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders SET
                status             = COALESCE($2, status),
                customer_name      = COALESCE($3, customer_name),
                customer_email     = COALESCE($4, customer_email),
                customer_phone     = CASE WHEN $3::TEXT IS NULL THEN customer_phone ELSE $5 END,
                original_file_ref  = COALESCE($6, original_file_ref),
                revised_file_ref   = COALESCE($7, revised_file_ref),
                payment_session_id = COALESCE($8, payment_session_id),
                payment_status     = COALESCE($9, payment_status),
                paid_at            = CASE WHEN $9::TEXT IS NULL THEN paid_at ELSE $10 END,
                interview_prep     = COALESCE($11, interview_prep),
                delivered_at       = COALESCE($12, delivered_at),
                version            = version + 1,
                updated_at         = NOW()
            WHERE id = $1 AND ($13::BIGINT IS NULL OR version = $13)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.customer.as_ref().map(|c| c.name.as_str()))
        .bind(patch.customer.as_ref().map(|c| c.email.as_str()))
        .bind(patch.customer.as_ref().and_then(|c| c.phone.as_deref()))
        .bind(patch.original_file_ref.as_deref())
        .bind(patch.revised_file_ref.as_deref())
        .bind(patch.payment.as_ref().map(|p| p.session_id.as_str()))
        .bind(patch.payment.as_ref().map(|p| p.status.as_str()))
        .bind(patch.payment.as_ref().and_then(|p| p.paid_at))
        .bind(patch.interview_prep)
        .bind(patch.delivered_at)
        .bind(patch.expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match (found, patch.expected_version) {
            (Some(found), Some(expected)) => Err(StoreError::StaleVersion {
                id,
                expected,
                found,
            }),
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC LIMIT $1")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }
}
