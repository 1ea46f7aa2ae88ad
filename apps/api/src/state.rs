use std::sync::Arc;

use crate::audit::auditor::QualityAuditor;
use crate::config::Config;
use crate::delivery::Notifier;
use crate::errors::AppError;
use crate::orders::store::OrderStore;
use crate::payments::PaymentAdapter;
use crate::storage::BlobStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Each external dependency is optional; handlers reach them through the
/// accessors below, which turn a missing one into `NOT_CONFIGURED`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orders: Option<Arc<dyn OrderStore>>,
    pub blobs: Option<Arc<dyn BlobStore>>,
    pub payments: Option<PaymentAdapter>,
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Always present; degrades to the fallback audit without credentials.
    pub auditor: Arc<QualityAuditor>,
}

impl AppState {
    pub fn orders(&self) -> Result<&dyn OrderStore, AppError> {
        self.orders
            .as_deref()
            .ok_or(AppError::NotConfigured("Order store"))
    }

    pub fn blobs(&self) -> Result<&dyn BlobStore, AppError> {
        self.blobs
            .as_deref()
            .ok_or(AppError::NotConfigured("Blob storage"))
    }

    pub fn payments(&self) -> Result<&PaymentAdapter, AppError> {
        self.payments
            .as_ref()
            .ok_or(AppError::NotConfigured("Payment gateway"))
    }

    pub fn notifier(&self) -> Result<&dyn Notifier, AppError> {
        self.notifier
            .as_deref()
            .ok_or(AppError::NotConfigured("Email delivery"))
    }
}
