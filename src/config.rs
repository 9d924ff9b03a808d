use anyhow::Context;
use bigdecimal::BigDecimal;
use chrono::FixedOffset;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::services::calculator::{PurchasePolicy, UnitRounding};
use crate::utils::timestamp::parse_utc_offset;

/// One day; the breaker's backoff doubles this for its upper bound.
pub const MAX_CIRCUIT_RESET_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub api_token: Option<String>,
    pub fee_percentage: BigDecimal,
    pub unit_rounding: UnitRounding,
    pub reporting_offset: FixedOffset,
    pub request_timeout_secs: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let fee_raw = get("FEE_PERCENTAGE", "0");
        let fee_percentage = BigDecimal::from_str(fee_raw.trim())
            .with_context(|| format!("FEE_PERCENTAGE must be a decimal, got '{}'", fee_raw))?;

        let unit_rounding = get("UNIT_ROUNDING", "fractional")
            .parse::<UnitRounding>()
            .context("UNIT_ROUNDING")?;

        let reporting_offset = parse_utc_offset(&get("REPORTING_UTC_OFFSET", "+00:00"))
            .map_err(|e| anyhow::anyhow!("REPORTING_UTC_OFFSET: {}", e))?;

        let config = Config {
            backend_url: get("BACKEND_URL", "http://localhost:8000"),
            api_token: lookup("API_TOKEN").filter(|token| !token.trim().is_empty()),
            fee_percentage,
            unit_rounding,
            reporting_offset,
            request_timeout_secs: get("REQUEST_TIMEOUT_SECS", "30")
                .parse()
                .context("REQUEST_TIMEOUT_SECS")?,
            circuit_failure_threshold: get("CIRCUIT_FAILURE_THRESHOLD", "3")
                .parse()
                .context("CIRCUIT_FAILURE_THRESHOLD")?,
            circuit_reset_timeout_secs: get("CIRCUIT_RESET_TIMEOUT_SECS", "60")
                .parse()
                .context("CIRCUIT_RESET_TIMEOUT_SECS")?,
        };

        // reject a fee outside [0, 1) at startup rather than on first purchase
        config.purchase_policy()?;

        if config.circuit_reset_timeout_secs == 0
            || config.circuit_reset_timeout_secs > MAX_CIRCUIT_RESET_TIMEOUT_SECS
        {
            anyhow::bail!(
                "CIRCUIT_RESET_TIMEOUT_SECS must be between 1 and {}, got {}",
                MAX_CIRCUIT_RESET_TIMEOUT_SECS,
                config.circuit_reset_timeout_secs
            );
        }

        Ok(config)
    }

    pub fn purchase_policy(&self) -> anyhow::Result<PurchasePolicy> {
        PurchasePolicy::new(self.fee_percentage.clone(), self.unit_rounding)
            .map_err(|e| anyhow::anyhow!("FEE_PERCENTAGE: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.fee_percentage, BigDecimal::from(0));
        assert_eq!(config.unit_rounding, UnitRounding::Fractional);
        assert_eq!(config.reporting_offset.local_minus_utc(), 0);
        assert_eq!(config.circuit_failure_threshold, 3);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BACKEND_URL", "https://billing.example.com/api"),
            ("FEE_PERCENTAGE", "0.04"),
            ("UNIT_ROUNDING", "floor"),
            ("REPORTING_UTC_OFFSET", "+03:00"),
            ("API_TOKEN", "abc"),
        ]))
        .unwrap();

        assert_eq!(config.backend_url, "https://billing.example.com/api");
        assert_eq!(config.fee_percentage, BigDecimal::from_str("0.04").unwrap());
        assert_eq!(config.unit_rounding, UnitRounding::Floor);
        assert_eq!(config.reporting_offset.local_minus_utc(), 3 * 3600);
        assert_eq!(config.api_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("FEE_PERCENTAGE", "1.2")])).is_err());
        assert!(Config::from_lookup(lookup(&[("FEE_PERCENTAGE", "four")])).is_err());
        assert!(Config::from_lookup(lookup(&[("UNIT_ROUNDING", "ceil")])).is_err());
        assert!(Config::from_lookup(lookup(&[("REPORTING_UTC_OFFSET", "3")])).is_err());
        assert!(Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "-1")])).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_reset_timeout() {
        assert!(Config::from_lookup(lookup(&[("CIRCUIT_RESET_TIMEOUT_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[(
            "CIRCUIT_RESET_TIMEOUT_SECS",
            "18446744073709551615"
        )]))
        .is_err());

        let config =
            Config::from_lookup(lookup(&[("CIRCUIT_RESET_TIMEOUT_SECS", "86400")])).unwrap();
        assert_eq!(config.circuit_reset_timeout_secs, MAX_CIRCUIT_RESET_TIMEOUT_SECS);
    }
}
