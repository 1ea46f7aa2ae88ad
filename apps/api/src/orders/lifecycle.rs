//! Order fulfillment state machine.
//!
//! ```text
//! analysis_complete -> checkout_started -> paid -> revised_ready -> delivered
//!                                                        |             ^
//!                                                        v             |
//!                                                 delivery_failed -----+
//! paid | revised_ready | delivery_failed | delivered -> refunded
//! ```
//!
//! `plan` is pure: it looks at the current order and an event and decides the
//! patch to write. `apply` runs it against a store under optimistic
//! concurrency. Status never moves to a lower rank; an event whose target rank
//! is below the current one still writes its fields but keeps the status.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::orders::models::{Customer, Order, OrderPatch, OrderStatus, Payment, PaymentStatus};
use crate::orders::store::{OrderStore, StoreError};

const MAX_APPLY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    CheckoutStarted {
        customer: Customer,
        session_id: String,
        interview_prep: bool,
    },
    PaymentConfirmed {
        session_id: String,
        paid_at: DateTime<Utc>,
    },
    RevisionAttached {
        file_ref: String,
    },
    Delivered {
        at: DateTime<Utc>,
    },
    DeliveryFailed,
    Refunded,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::CheckoutStarted { .. } => "checkout_started",
            OrderEvent::PaymentConfirmed { .. } => "payment_confirmed",
            OrderEvent::RevisionAttached { .. } => "revision_attached",
            OrderEvent::Delivered { .. } => "delivered",
            OrderEvent::DeliveryFailed => "delivery_failed",
            OrderEvent::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Apply(OrderPatch),
    NoOp,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("order is already paid")]
    AlreadyPaid,

    #[error("revised resume not uploaded")]
    RevisionMissing,

    #[error("order has not been paid")]
    NotPaid,

    #[error("order has no settled payment to refund")]
    NothingToRefund,

    #[error("order is {0} and can no longer change")]
    Terminal(OrderStatus),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The status an order ends up in when `target` is reached from `current`.
fn advance(current: OrderStatus, target: OrderStatus) -> OrderStatus {
    if target.rank() > current.rank() {
        target
    } else {
        current
    }
}

/// Delivery needs a stored revision and a settled payment.
pub fn check_deliverable(order: &Order) -> Result<(), TransitionError> {
    if order.status == OrderStatus::Refunded {
        return Err(TransitionError::Terminal(order.status));
    }
    if order.revised_file_ref.is_none() {
        return Err(TransitionError::RevisionMissing);
    }
    if !order.is_paid() {
        return Err(TransitionError::NotPaid);
    }
    Ok(())
}

pub fn plan(order: &Order, event: &OrderEvent) -> Result<Transition, TransitionError> {
    let patch = match event {
        OrderEvent::CheckoutStarted {
            customer,
            session_id,
            interview_prep,
        } => {
            if order.status.is_terminal() {
                return Err(TransitionError::Terminal(order.status));
            }
            if order.is_paid() {
                return Err(TransitionError::AlreadyPaid);
            }
            OrderPatch {
                status: Some(advance(order.status, OrderStatus::CheckoutStarted)),
                customer: Some(customer.clone()),
                payment: Some(Payment {
                    session_id: session_id.clone(),
                    status: PaymentStatus::Unpaid,
                    paid_at: None,
                }),
                interview_prep: Some(*interview_prep),
                ..Default::default()
            }
        }

        OrderEvent::PaymentConfirmed {
            session_id,
            paid_at,
        } => {
            // A late confirmation must not resurrect a refunded order.
            if order.is_paid() || order.status == OrderStatus::Refunded {
                return Ok(Transition::NoOp);
            }
            OrderPatch {
                status: Some(advance(order.status, OrderStatus::Paid)),
                payment: Some(Payment {
                    session_id: session_id.clone(),
                    status: PaymentStatus::Paid,
                    paid_at: Some(*paid_at),
                }),
                ..Default::default()
            }
        }

        OrderEvent::RevisionAttached { file_ref } => {
            if order.status.is_terminal() {
                return Err(TransitionError::Terminal(order.status));
            }
            OrderPatch {
                status: Some(advance(order.status, OrderStatus::RevisedReady)),
                revised_file_ref: Some(file_ref.clone()),
                ..Default::default()
            }
        }

        OrderEvent::Delivered { at } => {
            check_deliverable(order)?;
            OrderPatch {
                status: Some(advance(order.status, OrderStatus::Delivered)),
                delivered_at: Some(*at),
                ..Default::default()
            }
        }

        OrderEvent::DeliveryFailed => {
            let status = advance(order.status, OrderStatus::DeliveryFailed);
            if status == order.status {
                return Ok(Transition::NoOp);
            }
            OrderPatch {
                status: Some(status),
                ..Default::default()
            }
        }

        OrderEvent::Refunded => {
            if order.status == OrderStatus::Refunded {
                return Ok(Transition::NoOp);
            }
            let Some(payment) = order.payment.as_ref().filter(|_| order.is_paid()) else {
                return Err(TransitionError::NothingToRefund);
            };
            OrderPatch {
                status: Some(OrderStatus::Refunded),
                payment: Some(Payment {
                    status: PaymentStatus::Refunded,
                    ..payment.clone()
                }),
                ..Default::default()
            }
        }
    };
    Ok(Transition::Apply(patch))
}

/// Reads the order, plans the event and writes the result guarded by the
/// version that was read. A concurrent writer causes a re-read and re-plan.
pub async fn apply(
    store: &dyn OrderStore,
    id: Uuid,
    event: &OrderEvent,
) -> Result<Order, LifecycleError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let order = store.find(id).await?;
        let patch = match plan(&order, event)? {
            Transition::NoOp => {
                debug!("Order {id}: {} is a no-op in status {}", event.name(), order.status);
                return Ok(order);
            }
            Transition::Apply(patch) => patch.expecting(order.version),
        };

        match store.update(id, &patch).await {
            Ok(updated) => {
                info!(
                    "Order {id}: {} ({} -> {})",
                    event.name(),
                    order.status,
                    updated.status
                );
                return Ok(updated);
            }
            Err(StoreError::StaleVersion { .. }) if attempt < MAX_APPLY_ATTEMPTS => {
                debug!("Order {id}: concurrent update during {}, retrying", event.name());
            }
            Err(e) => return Err(e.into()),
        }
    }
}
