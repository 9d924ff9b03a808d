//! In-memory backend for offline use and tests.
//! Every write replaces the stored collection with a new one.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{apply_refund, Rate, RefundRequest, Session, Transaction, TransactionStatus};
use crate::error::{BillingError, BillingResult};
use crate::ports::{BillingBackend, PurchaseOrder, RateLookup};

#[derive(Default)]
struct State {
    rate: Option<Rate>,
    transactions: Arc<Vec<Transaction>>,
    balances: HashMap<String, BigDecimal>,
    offline: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
}

impl InMemoryBackend {
    pub fn new(rate: Option<Rate>, transactions: Vec<Transaction>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                rate,
                transactions: Arc::new(transactions),
                ..State::default()
            })),
        }
    }

    /// Simulate a network outage: every call fails with an availability error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn set_rate(&self, rate: Option<Rate>) {
        self.state.write().await.rate = rate;
    }

    /// Current snapshot; later writes do not affect it.
    pub async fn snapshot(&self) -> Arc<Vec<Transaction>> {
        self.state.read().await.transactions.clone()
    }

    pub async fn unit_balance(&self, device_id: &str) -> BigDecimal {
        self.state
            .read()
            .await
            .balances
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Admin refund of a completed transaction.
    pub async fn refund(
        &self,
        session: &Session,
        id: &str,
        request: &RefundRequest,
    ) -> BillingResult<Transaction> {
        if !session.is_admin() {
            return Err(BillingError::PermissionDenied(format!(
                "user {} is not allowed to refund transactions",
                session.user_id
            )));
        }

        let mut state = self.state.write().await;
        let updated = apply_refund(&state.transactions, id, request, Utc::now())?;
        let refunded = updated
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("transaction {}", id)))?;
        state.transactions = Arc::new(updated);

        tracing::info!(transaction_id = %id, amount = %request.amount, "Transaction refunded");
        Ok(refunded)
    }
}

#[async_trait]
impl RateLookup for InMemoryBackend {
    async fn active_rate(&self) -> BillingResult<Rate> {
        let state = self.state.read().await;
        if state.offline {
            return Err(BillingError::RateUnavailable("backend is offline".to_string()));
        }
        state
            .rate
            .clone()
            .filter(|rate| rate.is_active)
            .ok_or_else(|| BillingError::RateUnavailable("no active rate configured".to_string()))
    }
}

#[async_trait]
impl BillingBackend for InMemoryBackend {
    async fn purchase(&self, session: &Session, order: &PurchaseOrder) -> BillingResult<Transaction> {
        let mut state = self.state.write().await;
        if state.offline {
            return Err(BillingError::BackendUnavailable("backend is offline".to_string()));
        }

        let balance_before = state
            .balances
            .get(&order.device_id)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0));
        let balance_after = &balance_before + &order.units;

        let mut tx = Transaction::new(
            format!("TXN-{}", Uuid::new_v4()),
            order.amount.clone(),
            TransactionStatus::Completed,
            order.payment_method.clone(),
            Utc::now(),
        )
        .with_units(order.units.clone())
        .with_device(order.device_id.clone())
        .with_user(order.user_id.clone(), Some(session.username.clone()));
        tx.balance_before = Some(balance_before);
        tx.balance_after = Some(balance_after.clone());

        let mut next: Vec<Transaction> = state.transactions.as_ref().clone();
        next.push(tx.clone());
        state.transactions = Arc::new(next);
        state.balances.insert(order.device_id.clone(), balance_after);

        Ok(tx)
    }

    async fn transactions(&self, session: &Session) -> BillingResult<Vec<Transaction>> {
        let state = self.state.read().await;
        if state.offline {
            return Err(BillingError::BackendUnavailable("backend is offline".to_string()));
        }

        Ok(state
            .transactions
            .iter()
            .filter(|tx| session.is_admin() || tx.user_id.as_deref() == Some(session.user_id.as_str()))
            .cloned()
            .collect())
    }
}
