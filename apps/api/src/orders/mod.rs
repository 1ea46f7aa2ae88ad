//! Orders: the record kept per submitted resume, its storage, and the
//! fulfillment lifecycle that moves it from analysis to delivery.

pub mod handlers;
pub mod intake;
pub mod lifecycle;
pub mod models;
pub mod pg_store;
pub mod store;
