//! Purchase electricity use case.
//! Looks up the active rate, prices the purchase and submits it to the backend.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{Rate, Session, Transaction};
use crate::error::{BillingError, BillingResult};
use crate::ports::{BillingBackend, PurchaseOrder, RateLookup};
use crate::services::calculator::{
    ensure_positive_amount, PurchaseCalculator, PurchasePolicy, PurchaseResult,
};
use crate::validation::{sanitize_string, validate_device_id, validate_payment_method};

/// Input for the PurchaseElectricity use case.
#[derive(Debug, Clone)]
pub struct PurchaseInput {
    pub amount: BigDecimal,
    pub device_id: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub rate: Rate,
    pub result: PurchaseResult,
}

/// Output of the PurchaseElectricity use case.
#[derive(Debug, Clone)]
pub struct PurchaseOutput {
    pub quote: Quote,
    pub transaction: Transaction,
}

pub struct PurchaseElectricity {
    rates: Arc<dyn RateLookup>,
    backend: Arc<dyn BillingBackend>,
    calculator: PurchaseCalculator,
}

impl PurchaseElectricity {
    pub fn new(
        rates: Arc<dyn RateLookup>,
        backend: Arc<dyn BillingBackend>,
        policy: PurchasePolicy,
    ) -> Self {
        Self {
            rates,
            backend,
            calculator: PurchaseCalculator::new(policy),
        }
    }

    pub fn calculator(&self) -> &PurchaseCalculator {
        &self.calculator
    }

    pub async fn active_rate(&self) -> BillingResult<Rate> {
        self.rates.active_rate().await
    }

    /// Price an amount at the active rate. A failed lookup stops here.
    pub async fn quote(&self, amount: &BigDecimal) -> BillingResult<Quote> {
        ensure_positive_amount(amount)?;

        let rate = self.rates.active_rate().await?;
        let result = self.calculator.compute(amount, &rate)?;

        tracing::debug!(
            amount = %amount,
            rate = %rate.name,
            units = %result.units_purchased,
            "Quoted purchase"
        );

        Ok(Quote { rate, result })
    }

    pub async fn execute(
        &self,
        session: &Session,
        input: PurchaseInput,
    ) -> BillingResult<PurchaseOutput> {
        let device_id = sanitize_string(&input.device_id);
        let payment_method = sanitize_string(&input.payment_method);
        validate_device_id(&device_id)?;
        validate_payment_method(&payment_method)?;

        let quote = self.quote(&input.amount).await?;

        let order = PurchaseOrder {
            user_id: session.user_id.clone(),
            amount: input.amount,
            units: quote.result.units_purchased.clone(),
            payment_method,
            device_id,
        };

        let transaction = self.backend.purchase(session, &order).await?;

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %session.user_id,
            device_id = %order.device_id,
            units = %order.units,
            "Electricity purchase completed"
        );

        Ok(PurchaseOutput { quote, transaction })
    }
}
