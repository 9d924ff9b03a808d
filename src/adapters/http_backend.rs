//! JSON-over-HTTP implementation of the billing backend ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config as BreakerConfig, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::domain::{Rate, Session, Transaction, TransactionStatus};
use crate::error::{BillingError, BillingResult};
use crate::ports::{BillingBackend, PurchaseOrder, RateLookup};
use crate::utils::timestamp::parse_timestamp;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for the portal backend
#[derive(Clone)]
pub struct HttpBillingBackend {
    client: Client,
    base_url: String,
    circuit_breaker: Breaker,
}

impl HttpBillingBackend {
    /// Creates a client with a 30s timeout and a breaker that opens after 3 failures
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60, 30)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
        request_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .unwrap_or_default();

        // equal_jittered asserts a non-zero start
        let reset_timeout_secs = reset_timeout_secs.max(1);
        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs.saturating_mul(2)),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = BreakerConfig::new().failure_policy(policy).build();

        HttpBillingBackend {
            client,
            base_url,
            circuit_breaker,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_circuit_breaker(
            config.backend_url.clone(),
            config.circuit_failure_threshold,
            config.circuit_reset_timeout_secs,
            config.request_timeout_secs,
        )
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send_json<T>(&self, request: RequestBuilder, endpoint: &str) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let endpoint_name = endpoint.to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(BackendError::Status {
                        endpoint: endpoint_name,
                        status: status.as_u16(),
                    });
                }
                let body = response.json::<T>().await?;
                Ok(body)
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => Err(BackendError::CircuitBreakerOpen(format!(
                "backend circuit breaker is open, {} not attempted",
                endpoint
            ))),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Fetches the active rate from `GET /active-rate`
    pub async fn fetch_active_rate(&self) -> Result<Rate, BackendError> {
        let request = self.client.get(self.url("active-rate"));
        self.send_json::<Rate>(request, "active-rate").await
    }

    /// Submits a purchase to `POST /users/buy`
    pub async fn submit_purchase(
        &self,
        token: Option<&str>,
        order: &PurchaseOrder,
    ) -> Result<Transaction, BackendError> {
        let request = authorize(self.client.post(self.url("users/buy")), token).json(order);
        let wire = self.send_json::<WireTransaction>(request, "users/buy").await?;
        wire.into_domain()
    }

    /// Lists transactions: `GET /admin/transactions` for admins, else `GET /users/transactions`
    pub async fn fetch_transactions(
        &self,
        token: Option<&str>,
        admin: bool,
    ) -> Result<Vec<Transaction>, BackendError> {
        let path = if admin { "admin/transactions" } else { "users/transactions" };
        let request = authorize(self.client.get(self.url(path)), token);
        let rows = self.send_json::<Vec<WireTransaction>>(request, path).await?;
        rows.into_iter().map(WireTransaction::into_domain).collect()
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

#[async_trait]
impl RateLookup for HttpBillingBackend {
    async fn active_rate(&self) -> BillingResult<Rate> {
        let rate = self.fetch_active_rate().await.map_err(|e| {
            tracing::warn!(error = %e, "Active rate lookup failed");
            BillingError::RateUnavailable(e.to_string())
        })?;

        if !rate.is_active {
            return Err(BillingError::InvalidRate(format!(
                "rate '{}' returned by backend is not active",
                rate.name
            )));
        }
        rate.ensure_priced()?;

        tracing::debug!(rate = %rate.name, price = %rate.price_per_unit, "Fetched active rate");
        Ok(rate)
    }
}

#[async_trait]
impl BillingBackend for HttpBillingBackend {
    async fn purchase(&self, session: &Session, order: &PurchaseOrder) -> BillingResult<Transaction> {
        self.submit_purchase(session.token.as_deref(), order)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %order.user_id, "Purchase submission failed");
                BillingError::BackendUnavailable(e.to_string())
            })
    }

    async fn transactions(&self, session: &Session) -> BillingResult<Vec<Transaction>> {
        self.fetch_transactions(session.token.as_deref(), session.is_admin())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %session.user_id, "Transaction fetch failed");
                BillingError::BackendUnavailable(e.to_string())
            })
    }
}

/// Backend transaction shape, also accepted by the CLI's `--input` history files.
#[derive(Debug, Deserialize)]
pub(crate) struct WireTransaction {
    id: serde_json::Value,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    user: Option<String>,
    amount: BigDecimal,
    #[serde(default)]
    units_purchased: Option<BigDecimal>,
    status: String,
    payment_method: String,
    #[serde(alias = "transaction_date")]
    timestamp: String,
    #[serde(default)]
    balance_before: Option<BigDecimal>,
    #[serde(default)]
    balance_after: Option<BigDecimal>,
    #[serde(default)]
    device_id: Option<serde_json::Value>,
    #[serde(default)]
    notes: Option<String>,
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl WireTransaction {
    pub(crate) fn into_domain(self) -> Result<Transaction, BackendError> {
        let status: TransactionStatus = self
            .status
            .parse()
            .map_err(|e: BillingError| BackendError::InvalidResponse(e.to_string()))?;
        let timestamp = parse_timestamp(&self.timestamp).map_err(BackendError::InvalidResponse)?;

        Ok(Transaction {
            id: id_string(&self.id),
            user_id: self.user_id.as_ref().map(id_string),
            user: self.user,
            amount: self.amount,
            units_purchased: self.units_purchased,
            status,
            payment_method: self.payment_method,
            timestamp,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            device_id: self.device_id.as_ref().map(id_string).unwrap_or_default(),
            notes: self.notes,
            refund: None,
        })
    }
}
