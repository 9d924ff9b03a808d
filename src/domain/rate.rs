//! Electricity rate entity.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::utils::timestamp::deserialize_optional_date;

/// Price per unit (kWh) in effect for purchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "rate_name", alias = "name")]
    pub name: String,
    pub price_per_unit: BigDecimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub effective_date: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

impl Rate {
    pub fn new(name: impl Into<String>, price_per_unit: BigDecimal) -> Self {
        Self {
            id: None,
            name: name.into(),
            price_per_unit,
            is_active: true,
            effective_date: None,
        }
    }

    pub fn with_effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    /// A usable rate must carry a positive price.
    pub fn ensure_priced(&self) -> BillingResult<()> {
        if self.price_per_unit <= BigDecimal::from(0) {
            return Err(BillingError::InvalidRate(format!(
                "price per unit for '{}' must be greater than zero, got {}",
                self.name, self.price_per_unit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_deserializes_backend_shape() {
        let json = r#"{
            "id": 3,
            "rate_name": "Residential Standard",
            "price_per_unit": 100,
            "is_active": true,
            "effective_date": "2024-01-01T00:00:00",
            "created_at": "2024-01-01T00:00:00",
            "updated_at": "2024-01-01T00:00:00"
        }"#;

        let rate: Rate = serde_json::from_str(json).unwrap();
        assert_eq!(rate.id, Some(3));
        assert_eq!(rate.name, "Residential Standard");
        assert_eq!(rate.price_per_unit, BigDecimal::from(100));
        assert_eq!(rate.effective_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_non_positive_price_is_invalid() {
        let rate = Rate::new("Broken", BigDecimal::from(0));
        assert!(matches!(rate.ensure_priced(), Err(BillingError::InvalidRate(_))));

        let rate = Rate::new("Standard", BigDecimal::from(100));
        assert!(rate.ensure_priced().is_ok());
    }
}
