//! Seams to the external billing backend.
//! Use cases depend on these traits; adapters implement them.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::domain::{Rate, Session, Transaction};
use crate::error::BillingResult;

/// Supplies the currently active price per unit.
#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Fails with `RateUnavailable` when no active rate can be retrieved.
    async fn active_rate(&self) -> BillingResult<Rate>;
}

/// Purchase submission body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseOrder {
    pub user_id: String,
    pub amount: BigDecimal,
    pub units: BigDecimal,
    pub payment_method: String,
    pub device_id: String,
}

#[async_trait]
pub trait BillingBackend: Send + Sync {
    async fn purchase(&self, session: &Session, order: &PurchaseOrder) -> BillingResult<Transaction>;

    /// All transactions for admins, otherwise only the caller's own.
    async fn transactions(&self, session: &Session) -> BillingResult<Vec<Transaction>>;
}
