use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::Rate;
use crate::error::{BillingError, BillingResult};
use crate::validation::{sanitize_string, AMOUNT_INPUT_MAX_LEN};

/// How purchased units are derived from `amount / price_per_unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRounding {
    /// Keep the exact quotient.
    #[default]
    Fractional,
    /// Whole units only; the remainder is not credited as units.
    Floor,
}

impl FromStr for UnitRounding {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fractional" => Ok(UnitRounding::Fractional),
            "floor" => Ok(UnitRounding::Floor),
            other => Err(BillingError::Validation(crate::validation::ValidationError::new(
                "unit_rounding",
                format!("must be one of: fractional, floor (got '{}')", other),
            ))),
        }
    }
}

/// Product rules for purchases. Both choices are configuration, not code.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchasePolicy {
    pub fee_percentage: BigDecimal,
    pub unit_rounding: UnitRounding,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            fee_percentage: BigDecimal::from(0),
            unit_rounding: UnitRounding::Fractional,
        }
    }
}

impl PurchasePolicy {
    pub fn new(fee_percentage: BigDecimal, unit_rounding: UnitRounding) -> BillingResult<Self> {
        validate_fee(&fee_percentage)?;
        Ok(Self {
            fee_percentage,
            unit_rounding,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub amount_tendered: BigDecimal,
    pub fee_percentage: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseResult {
    pub amount_tendered: BigDecimal,
    pub price_per_unit: BigDecimal,
    pub units_purchased: BigDecimal,
    pub fee_amount: BigDecimal,
    pub net_amount: BigDecimal,
}

pub fn validate_fee(fee_percentage: &BigDecimal) -> BillingResult<()> {
    if fee_percentage < &BigDecimal::from(0) || fee_percentage >= &BigDecimal::from(1) {
        return Err(BillingError::InvalidFee(format!(
            "fee percentage must be in [0, 1), got {}",
            fee_percentage
        )));
    }
    Ok(())
}

pub fn ensure_positive_amount(amount: &BigDecimal) -> BillingResult<()> {
    if amount <= &BigDecimal::from(0) {
        return Err(BillingError::InvalidAmount(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    Ok(())
}

/// Units, fee and net amount for a tendered amount at the given rate.
/// Units keep their fractional part.
pub fn compute_purchase(
    amount: &BigDecimal,
    rate: &Rate,
    fee_percentage: &BigDecimal,
) -> BillingResult<PurchaseResult> {
    ensure_positive_amount(amount)?;
    rate.ensure_priced()?;
    validate_fee(fee_percentage)?;

    let units_purchased = amount / &rate.price_per_unit;
    let fee_amount = amount * fee_percentage;
    let net_amount = amount - &fee_amount;

    Ok(PurchaseResult {
        amount_tendered: amount.clone(),
        price_per_unit: rate.price_per_unit.clone(),
        units_purchased,
        fee_amount,
        net_amount,
    })
}

/// Calculator bound to a purchase policy.
#[derive(Debug, Clone, Default)]
pub struct PurchaseCalculator {
    policy: PurchasePolicy,
}

impl PurchaseCalculator {
    pub fn new(policy: PurchasePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PurchasePolicy {
        &self.policy
    }

    pub fn compute(&self, amount: &BigDecimal, rate: &Rate) -> BillingResult<PurchaseResult> {
        let mut result = compute_purchase(amount, rate, &self.policy.fee_percentage)?;
        if self.policy.unit_rounding == UnitRounding::Floor {
            // amounts are positive here, so truncation is the floor
            result.units_purchased = result.units_purchased.with_scale(0);
        }
        Ok(result)
    }

    pub fn compute_request(
        &self,
        request: &PurchaseRequest,
        rate: &Rate,
    ) -> BillingResult<PurchaseResult> {
        let calculator = PurchaseCalculator::new(PurchasePolicy {
            fee_percentage: request.fee_percentage.clone(),
            unit_rounding: self.policy.unit_rounding,
        });
        calculator.compute(&request.amount_tendered, rate)
    }
}

/// Parse a user-entered amount such as `10000`, `10,000`, `$25` or `TSh 5000`.
pub fn parse_amount(input: &str) -> BillingResult<BigDecimal> {
    let cleaned = sanitize_string(input);
    if cleaned.is_empty() {
        return Err(BillingError::InvalidAmount("amount is required".to_string()));
    }
    if cleaned.len() > AMOUNT_INPUT_MAX_LEN {
        return Err(BillingError::InvalidAmount(format!(
            "amount must be at most {} characters",
            AMOUNT_INPUT_MAX_LEN
        )));
    }

    let lowered = cleaned.to_ascii_lowercase();
    let numeric = lowered
        .trim_start_matches("tsh")
        .trim_start_matches('$')
        .replace([',', ' '], "");

    let amount = BigDecimal::from_str(&numeric)
        .map_err(|_| BillingError::InvalidAmount(format!("'{}' is not a number", cleaned)))?;

    ensure_positive_amount(&amount)?;
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn rate(price: &str) -> Rate {
        Rate::new("Residential Standard", dec(price))
    }

    #[test]
    fn test_scenario_with_four_percent_fee() {
        let result = compute_purchase(&dec("10000"), &rate("100"), &dec("0.04")).unwrap();
        assert_eq!(result.units_purchased, dec("100"));
        assert_eq!(result.fee_amount, dec("400"));
        assert_eq!(result.net_amount, dec("9600"));
    }

    #[test]
    fn test_net_plus_fee_equals_amount() {
        let cases = [
            ("10000", "100", "0.04"),
            ("1", "0.2", "0.015"),
            ("125.50", "0.1435", "0.3333"),
            ("78.25", "7", "0"),
        ];
        for (amount, price, fee) in cases {
            let result = compute_purchase(&dec(amount), &rate(price), &dec(fee)).unwrap();
            assert_eq!(&result.net_amount + &result.fee_amount, dec(amount));
        }
    }

    #[test]
    fn test_non_positive_amounts_share_one_error() {
        assert!(ensure_positive_amount(&dec("0.01")).is_ok());
        for amount in ["0", "-5"] {
            let expected = ensure_positive_amount(&dec(amount)).unwrap_err();
            assert!(matches!(expected, BillingError::InvalidAmount(_)));
            assert_eq!(
                compute_purchase(&dec(amount), &rate("100"), &dec("0")).unwrap_err(),
                expected
            );
            assert_eq!(parse_amount(amount).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_zero_fee_keeps_full_amount() {
        let result = compute_purchase(&dec("45.60"), &rate("0.1425"), &dec("0")).unwrap();
        assert_eq!(result.net_amount, dec("45.60"));
        assert_eq!(result.fee_amount, dec("0"));
    }

    #[test]
    fn test_fractional_units_are_preserved() {
        let result = compute_purchase(&dec("250"), &rate("100"), &dec("0")).unwrap();
        assert_eq!(result.units_purchased, dec("2.5"));
    }

    #[test]
    fn test_floor_policy_truncates_units() {
        let calculator = PurchaseCalculator::new(
            PurchasePolicy::new(dec("0"), UnitRounding::Floor).unwrap(),
        );
        let result = calculator.compute(&dec("250"), &rate("100")).unwrap();
        assert_eq!(result.units_purchased, dec("2"));
        assert_eq!(result.net_amount, dec("250"));
    }

    #[test]
    fn test_compute_request_uses_request_fee() {
        let calculator = PurchaseCalculator::default();
        let request = PurchaseRequest {
            amount_tendered: dec("10000"),
            fee_percentage: dec("0.04"),
        };
        let result = calculator.compute_request(&request, &rate("100")).unwrap();
        assert_eq!(result.fee_amount, dec("400"));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            compute_purchase(&dec("0"), &rate("100"), &dec("0")),
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            compute_purchase(&dec("10"), &rate("0"), &dec("0")),
            Err(BillingError::InvalidRate(_))
        ));
        assert!(matches!(
            compute_purchase(&dec("10"), &rate("1"), &dec("1")),
            Err(BillingError::InvalidFee(_))
        ));
        assert!(PurchasePolicy::new(dec("-0.1"), UnitRounding::Fractional).is_err());
    }

    #[test]
    fn test_deterministic() {
        let a = compute_purchase(&dec("333"), &rate("7"), &dec("0.05")).unwrap();
        let b = compute_purchase(&dec("333"), &rate("7"), &dec("0.05")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("10000").unwrap(), dec("10000"));
        assert_eq!(parse_amount("10,000").unwrap(), dec("10000"));
        assert_eq!(parse_amount("$25.50").unwrap(), dec("25.50"));
        assert_eq!(parse_amount("TSh 5000").unwrap(), dec("5000"));
        assert!(matches!(parse_amount("ten"), Err(BillingError::InvalidAmount(_))));
        assert!(matches!(parse_amount("-5"), Err(BillingError::InvalidAmount(_))));
        assert!(matches!(parse_amount("  "), Err(BillingError::InvalidAmount(_))));
    }

    #[test]
    fn test_unit_rounding_from_str() {
        assert_eq!("floor".parse::<UnitRounding>().unwrap(), UnitRounding::Floor);
        assert_eq!("Fractional".parse::<UnitRounding>().unwrap(), UnitRounding::Fractional);
        assert!("round".parse::<UnitRounding>().is_err());
    }
}
