//! Transaction domain entity.
//! Read-only copy of a purchase record owned by the backend.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, BillingResult};
use crate::utils::timestamp::deserialize_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Completed,
        TransactionStatus::Pending,
        TransactionStatus::Failed,
        TransactionStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" => Ok(TransactionStatus::Completed),
            "pending" => Ok(TransactionStatus::Pending),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(BillingError::Validation(
                crate::validation::ValidationError::new(
                    "status",
                    format!("unknown transaction status '{}'", other),
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundDetails {
    pub date: DateTime<Utc>,
    pub amount: BigDecimal,
    pub reason: String,
    pub processed_by: String,
}

/// Admin input for a refund; the date is stamped when it is applied.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub amount: BigDecimal,
    pub reason: String,
    pub processed_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    pub amount: BigDecimal,
    #[serde(default)]
    pub units_purchased: Option<BigDecimal>,
    pub status: TransactionStatus,
    pub payment_method: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub balance_before: Option<BigDecimal>,
    #[serde(default)]
    pub balance_after: Option<BigDecimal>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub refund: Option<RefundDetails>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        amount: BigDecimal,
        status: TransactionStatus,
        payment_method: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            user: None,
            amount,
            units_purchased: None,
            status,
            payment_method: payment_method.into(),
            timestamp,
            balance_before: None,
            balance_after: None,
            device_id: String::new(),
            notes: None,
            refund: None,
        }
    }

    pub fn with_units(mut self, units: BigDecimal) -> Self {
        self.units_purchased = Some(units);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>, user: Option<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user = user;
        self
    }

    /// Units usable for price-weighted figures: present and strictly positive.
    pub fn priced_units(&self) -> Option<&BigDecimal> {
        self.units_purchased
            .as_ref()
            .filter(|units| **units > BigDecimal::from(0))
    }

    /// Effective price paid per unit, when the unit count is known.
    pub fn unit_price(&self) -> Option<BigDecimal> {
        self.priced_units().map(|units| &self.amount / units)
    }

    /// Returns a refunded copy of this transaction. Only completed
    /// transactions can be refunded, for at most the original amount.
    pub fn refund(&self, request: &RefundRequest, now: DateTime<Utc>) -> BillingResult<Transaction> {
        if self.status != TransactionStatus::Completed {
            return Err(BillingError::InvalidTransition(format!(
                "transaction {} is {}, only completed transactions can be refunded",
                self.id, self.status
            )));
        }

        if request.amount <= BigDecimal::from(0) || request.amount > self.amount {
            return Err(BillingError::InvalidAmount(format!(
                "refund amount {} must be in (0, {}]",
                request.amount, self.amount
            )));
        }

        let notes = match (&self.notes, request.notes.as_deref().filter(|n| !n.is_empty())) {
            (Some(existing), Some(extra)) => Some(format!("{}. Refund notes: {}", existing, extra)),
            (None, Some(extra)) => Some(format!("Refund notes: {}", extra)),
            (existing, None) => existing.clone(),
        };

        Ok(Transaction {
            status: TransactionStatus::Refunded,
            notes,
            refund: Some(RefundDetails {
                date: now,
                amount: request.amount.clone(),
                reason: request.reason.clone(),
                processed_by: request.processed_by.clone(),
            }),
            ..self.clone()
        })
    }
}

/// Produce a new collection with the identified transaction refunded.
/// The input slice is left untouched.
pub fn apply_refund(
    transactions: &[Transaction],
    id: &str,
    request: &RefundRequest,
    now: DateTime<Utc>,
) -> BillingResult<Vec<Transaction>> {
    let target = transactions
        .iter()
        .find(|tx| tx.id == id)
        .ok_or_else(|| BillingError::NotFound(format!("transaction {}", id)))?;
    let refunded = target.refund(request, now)?;

    Ok(transactions
        .iter()
        .map(|tx| if tx.id == id { refunded.clone() } else { tx.clone() })
        .collect())
}
