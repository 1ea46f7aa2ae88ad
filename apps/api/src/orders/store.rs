#[cfg(test)]
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
#[cfg(test)]
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::orders::models::{Order, OrderPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("order {0} already exists")]
    DuplicateId(Uuid),

    #[error("order {id} was modified concurrently (expected version {expected}, found {found})")]
    StaleVersion { id: Uuid, expected: i64, found: i64 },

    #[error("stored order {id} is invalid: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// CRUD over orders keyed by id.
///
/// `update` is a field-level merge: fields absent from the patch are never
/// touched, so concurrent writers to disjoint fields do not clobber each
/// other. Writers that need read-modify-write safety set
/// `OrderPatch::expected_version`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), StoreError>;
    async fn find(&self, id: Uuid) -> Result<Order, StoreError>;
    async fn update(&self, id: Uuid, patch: &OrderPatch) -> Result<Order, StoreError>;
    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<Order>, StoreError>;
}

/// Process-local store backing the lifecycle and router tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

#[cfg(test)]
impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateId(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: Uuid, patch: &OrderPatch) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(expected) = patch.expected_version {
            if order.version != expected {
                return Err(StoreError::StaleVersion {
                    id,
                    expected,
                    found: order.version,
                });
            }
        }
        patch.merge_into(order);
        Ok(order.clone())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let mut all: Vec<Order> = self.orders.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}
