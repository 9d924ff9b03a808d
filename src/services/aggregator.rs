use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::{Transaction, TransactionStatus};
use crate::error::BillingError;
use crate::validation::ValidationError;

/// Half-open UTC window `[start, end)`; either side may be open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Whole calendar days `from..=to` as seen in the reporting offset.
    pub fn between_dates(from: Option<NaiveDate>, to: Option<NaiveDate>, offset: FixedOffset) -> Self {
        Self {
            start: from.map(|date| local_midnight_utc(date, offset)),
            end: to
                .and_then(|date| date.succ_opt())
                .map(|date| local_midnight_utc(date, offset)),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *ts >= start) && self.end.map_or(true, |end| *ts < end)
    }
}

fn local_midnight_utc(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, Utc)
}

/// Conjunction of optional predicates. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<String>,
    pub date_range: Option<DateRange>,
    /// Case-insensitive substring over id, user name and amount.
    pub search: Option<String>,
    pub min_amount: Option<BigDecimal>,
}

impl TransactionFilter {
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_min_amount(mut self, amount: BigDecimal) -> Self {
        self.min_amount = Some(amount);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(status) = self.status {
            if tx.status != status {
                return false;
            }
        }

        if let Some(ref method) = self.payment_method {
            if !tx.payment_method.eq_ignore_ascii_case(method) {
                return false;
            }
        }

        if let Some(ref range) = self.date_range {
            if !range.contains(&tx.timestamp) {
                return false;
            }
        }

        if let Some(ref min) = self.min_amount {
            if &tx.amount < min {
                return false;
            }
        }

        if let Some(ref term) = self.search {
            let term = term.trim().to_lowercase();
            if !term.is_empty() {
                let hit = tx.id.to_lowercase().contains(&term)
                    || tx
                        .user
                        .as_deref()
                        .map_or(false, |user| user.to_lowercase().contains(&term))
                    || tx.amount.to_string().contains(&term);
                if !hit {
                    return false;
                }
            }
        }

        true
    }

    pub fn apply<'a>(&self, transactions: &'a [Transaction]) -> Vec<&'a Transaction> {
        transactions.iter().filter(|tx| self.matches(tx)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub count: u64,
    pub amount: BigDecimal,
}

impl Default for Breakdown {
    fn default() -> Self {
        Self {
            count: 0,
            amount: BigDecimal::from(0),
        }
    }
}

impl Breakdown {
    fn add(&mut self, amount: &BigDecimal) {
        self.count += 1;
        self.amount += amount.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingSummary {
    pub total_transactions: u64,
    pub total_amount: BigDecimal,
    pub total_units: BigDecimal,
    pub average_amount: BigDecimal,
    pub breakdown_by_status: BTreeMap<TransactionStatus, Breakdown>,
    /// Keyed by lowercased payment method, matching the filter's case-insensitivity.
    pub breakdown_by_payment_method: BTreeMap<String, Breakdown>,
}

/// Totals, average and per-key breakdowns over the matching transactions.
/// Ordering of the input does not affect the result.
pub fn summarize(transactions: &[Transaction], filter: &TransactionFilter) -> BillingSummary {
    let mut total_transactions: u64 = 0;
    let mut total_amount = BigDecimal::from(0);
    let mut total_units = BigDecimal::from(0);
    let mut breakdown_by_status: BTreeMap<TransactionStatus, Breakdown> = BTreeMap::new();
    let mut breakdown_by_payment_method: BTreeMap<String, Breakdown> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| filter.matches(tx)) {
        total_transactions += 1;
        total_amount += tx.amount.clone();
        if let Some(ref units) = tx.units_purchased {
            total_units += units.clone();
        }
        breakdown_by_status.entry(tx.status).or_default().add(&tx.amount);
        breakdown_by_payment_method
            .entry(tx.payment_method.to_ascii_lowercase())
            .or_default()
            .add(&tx.amount);
    }

    let average_amount = if total_transactions > 0 {
        total_amount.clone() / BigDecimal::from(total_transactions)
    } else {
        BigDecimal::from(0)
    };

    BillingSummary {
        total_transactions,
        total_amount,
        total_units,
        average_amount,
        breakdown_by_status,
        breakdown_by_payment_method,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl FromStr for Granularity {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            other => Err(BillingError::Validation(ValidationError::new(
                "granularity",
                format!("must be one of: daily, weekly (got '{}')", other),
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageBucket {
    pub label: String,
    pub start: NaiveDate,
    /// Last day in the bucket, inclusive.
    pub end: NaiveDate,
    pub transaction_count: u64,
    pub total_units: BigDecimal,
    pub total_cost: BigDecimal,
    pub priced_units: BigDecimal,
    pub priced_cost: BigDecimal,
    /// `priced_cost / priced_units`; absent when no transaction carried units.
    pub average_price: Option<BigDecimal>,
}

impl UsageBucket {
    fn empty(label: String, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            label,
            start,
            end,
            transaction_count: 0,
            total_units: BigDecimal::from(0),
            total_cost: BigDecimal::from(0),
            priced_units: BigDecimal::from(0),
            priced_cost: BigDecimal::from(0),
            average_price: None,
        }
    }

    fn add(&mut self, tx: &Transaction) {
        self.transaction_count += 1;
        self.total_cost += tx.amount.clone();
        if let Some(ref units) = tx.units_purchased {
            self.total_units += units.clone();
        }
        if let Some(units) = tx.priced_units() {
            self.priced_units += units.clone();
            self.priced_cost += tx.amount.clone();
        }
    }
}

fn bucket_bounds(date: NaiveDate, granularity: Granularity) -> (String, NaiveDate, NaiveDate) {
    match granularity {
        Granularity::Daily => (date.format("%Y-%m-%d").to_string(), date, date),
        Granularity::Weekly => {
            let iso = date.iso_week();
            let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            (
                format!("{}-W{:02}", iso.year(), iso.week()),
                start,
                start + Duration::days(6),
            )
        }
    }
}

/// Group matching transactions by local calendar day or ISO week.
pub fn rollup(
    transactions: &[Transaction],
    filter: &TransactionFilter,
    granularity: Granularity,
    offset: FixedOffset,
) -> Vec<UsageBucket> {
    let mut buckets: BTreeMap<NaiveDate, UsageBucket> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| filter.matches(tx)) {
        let local_date = tx.timestamp.with_timezone(&offset).date_naive();
        let (label, start, end) = bucket_bounds(local_date, granularity);
        buckets
            .entry(start)
            .or_insert_with(|| UsageBucket::empty(label, start, end))
            .add(tx);
    }

    buckets
        .into_values()
        .map(|mut bucket| {
            if bucket.priced_units > BigDecimal::from(0) {
                bucket.average_price = Some(&bucket.priced_cost / &bucket.priced_units);
            }
            bucket
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStatistics {
    pub bucket_count: u64,
    pub total_units: BigDecimal,
    pub total_cost: BigDecimal,
    pub average_units_per_bucket: BigDecimal,
    /// Label and units of the busiest bucket; earliest wins a tie.
    pub peak: Option<(String, BigDecimal)>,
}

pub fn usage_statistics(buckets: &[UsageBucket]) -> UsageStatistics {
    let total_units = buckets
        .iter()
        .fold(BigDecimal::from(0), |acc, b| acc + b.total_units.clone());
    let total_cost = buckets
        .iter()
        .fold(BigDecimal::from(0), |acc, b| acc + b.total_cost.clone());

    let mut peak: Option<&UsageBucket> = None;
    for bucket in buckets {
        if peak.map_or(true, |p| bucket.total_units > p.total_units) {
            peak = Some(bucket);
        }
    }

    let bucket_count = buckets.len() as u64;
    let average_units_per_bucket = if bucket_count > 0 {
        total_units.clone() / BigDecimal::from(bucket_count)
    } else {
        BigDecimal::from(0)
    };

    UsageStatistics {
        bucket_count,
        total_units,
        total_cost,
        average_units_per_bucket,
        peak: peak.map(|b| (b.label.clone(), b.total_units.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn tx(id: &str, amount: &str, status: TransactionStatus, ts: DateTime<Utc>) -> Transaction {
        Transaction::new(id, dec(amount), status, "credit", ts)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_summarize_scenario() {
        let txs = vec![
            tx("T1", "100", TransactionStatus::Completed, at(1, 10)),
            tx("T2", "50", TransactionStatus::Failed, at(1, 11)),
        ];
        let summary = summarize(&txs, &TransactionFilter::default());

        assert_eq!(summary.total_transactions, 2);
        assert_eq!(summary.total_amount, dec("150"));
        assert_eq!(summary.average_amount, dec("75"));
        assert_eq!(
            summary.breakdown_by_status[&TransactionStatus::Completed],
            Breakdown { count: 1, amount: dec("100") }
        );
        assert_eq!(
            summary.breakdown_by_status[&TransactionStatus::Failed],
            Breakdown { count: 1, amount: dec("50") }
        );
        assert_eq!(summary.breakdown_by_status.len(), 2);
    }

    #[test]
    fn test_payment_method_breakdown_ignores_case() {
        let mut mixed = tx("T1", "30", TransactionStatus::Completed, at(1, 10));
        mixed.payment_method = "PayPal".to_string();
        let mut lower = tx("T2", "20", TransactionStatus::Completed, at(2, 10));
        lower.payment_method = "paypal".to_string();
        let txs = vec![mixed, lower, tx("T3", "5", TransactionStatus::Completed, at(3, 10))];

        let summary = summarize(&txs, &TransactionFilter::default());
        assert_eq!(summary.breakdown_by_payment_method.len(), 2);
        assert_eq!(
            summary.breakdown_by_payment_method["paypal"],
            Breakdown { count: 2, amount: dec("50") }
        );

        let filtered = summarize(&txs, &TransactionFilter::default().with_payment_method("PAYPAL"));
        assert_eq!(filtered.total_transactions, 2);
        assert_eq!(filtered.breakdown_by_payment_method.len(), 1);
        assert_eq!(
            filtered.breakdown_by_payment_method["paypal"],
            summary.breakdown_by_payment_method["paypal"]
        );
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], &TransactionFilter::default());
        assert_eq!(summary.total_transactions, 0);
        assert_eq!(summary.total_amount, dec("0"));
        assert_eq!(summary.average_amount, dec("0"));
        assert!(summary.breakdown_by_status.is_empty());
    }

    #[test]
    fn test_summarize_is_order_independent_and_idempotent() {
        let txs = vec![
            tx("T1", "125.50", TransactionStatus::Completed, at(1, 10)).with_units(dec("875")),
            tx("T2", "78.25", TransactionStatus::Completed, at(2, 10)).with_units(dec("547")),
            tx("T3", "45.60", TransactionStatus::Pending, at(3, 10)),
            tx("T4", "212.30", TransactionStatus::Failed, at(4, 10)),
        ];
        let filter = TransactionFilter::default();
        let baseline = summarize(&txs, &filter);

        let mut reversed = txs.clone();
        reversed.reverse();
        let mut rotated = txs.clone();
        rotated.rotate_left(2);

        assert_eq!(summarize(&reversed, &filter), baseline);
        assert_eq!(summarize(&rotated, &filter), baseline);
        assert_eq!(summarize(&txs, &filter), baseline);
        assert_eq!(baseline.total_units, dec("1422"));
    }

    #[test]
    fn test_filter_is_conjunction() {
        let mut paypal = tx("T2", "80", TransactionStatus::Completed, at(2, 10));
        paypal.payment_method = "paypal".to_string();
        let txs = vec![
            tx("T1", "100", TransactionStatus::Completed, at(1, 10)),
            paypal,
            tx("T3", "60", TransactionStatus::Failed, at(2, 12)),
        ];

        let filter = TransactionFilter::default()
            .with_status(TransactionStatus::Completed)
            .with_payment_method("PayPal");
        let summary = summarize(&txs, &filter);
        assert_eq!(summary.total_transactions, 1);
        assert_eq!(summary.total_amount, dec("80"));

        let filter = TransactionFilter::default().with_min_amount(dec("70"));
        assert_eq!(summarize(&txs, &filter).total_transactions, 2);

        let filter = TransactionFilter::default().with_search("t3");
        assert_eq!(summarize(&txs, &filter).total_amount, dec("60"));
    }

    #[test]
    fn test_date_range_includes_whole_end_day() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let range = DateRange::between_dates(
            NaiveDate::from_ymd_opt(2024, 1, 2),
            NaiveDate::from_ymd_opt(2024, 1, 3),
            offset,
        );
        assert!(!range.contains(&at(1, 23)));
        assert!(range.contains(&at(2, 0)));
        assert!(range.contains(&Utc.with_ymd_and_hms(2024, 1, 3, 23, 59, 59).unwrap()));
        assert!(!range.contains(&at(4, 0)));
    }

    #[test]
    fn test_date_range_respects_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let range = DateRange::between_dates(NaiveDate::from_ymd_opt(2024, 1, 2), None, offset);
        // 2024-01-01 22:00 UTC is already Jan 2nd at +03:00
        assert!(range.contains(&at(1, 22)));
        assert!(!range.contains(&at(1, 20)));
    }

    #[test]
    fn test_daily_rollup_uses_reporting_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let txs = vec![
            tx("T1", "100", TransactionStatus::Completed, at(1, 10)).with_units(dec("10")),
            tx("T2", "50", TransactionStatus::Completed, at(1, 22)).with_units(dec("5")),
        ];
        let buckets = rollup(&txs, &TransactionFilter::default(), Granularity::Daily, offset);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "2024-01-01");
        assert_eq!(buckets[1].label, "2024-01-02");
        assert_eq!(buckets[1].total_cost, dec("50"));
    }

    #[test]
    fn test_bucket_average_price_is_cost_weighted() {
        let offset = FixedOffset::east_opt(0).unwrap();
        // unit prices 10 and 20; simple mean would be 15
        let txs = vec![
            tx("T1", "100", TransactionStatus::Completed, at(1, 8)).with_units(dec("10")),
            tx("T2", "20", TransactionStatus::Completed, at(1, 9)).with_units(dec("1")),
        ];
        let buckets = rollup(&txs, &TransactionFilter::default(), Granularity::Daily, offset);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_units, dec("11"));
        assert_eq!(buckets[0].average_price, Some(dec("120") / dec("11")));
    }

    #[test]
    fn test_missing_units_excluded_from_price() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let txs = vec![
            tx("T1", "100", TransactionStatus::Completed, at(1, 8)).with_units(dec("10")),
            tx("T2", "500", TransactionStatus::Completed, at(1, 9)),
        ];
        let buckets = rollup(&txs, &TransactionFilter::default(), Granularity::Daily, offset);

        assert_eq!(buckets[0].total_cost, dec("600"));
        assert_eq!(buckets[0].priced_cost, dec("100"));
        assert_eq!(buckets[0].average_price, Some(dec("10")));

        let unpriced = vec![tx("T3", "500", TransactionStatus::Completed, at(2, 9))];
        let buckets = rollup(&unpriced, &TransactionFilter::default(), Granularity::Daily, offset);
        assert_eq!(buckets[0].average_price, None);
    }

    #[test]
    fn test_weekly_rollup_groups_iso_weeks() {
        let offset = FixedOffset::east_opt(0).unwrap();
        // 2024-01-01 is a Monday; the 7th is Sunday of the same week
        let txs = vec![
            tx("T1", "10", TransactionStatus::Completed, at(1, 8)).with_units(dec("1")),
            tx("T2", "10", TransactionStatus::Completed, at(7, 8)).with_units(dec("1")),
            tx("T3", "10", TransactionStatus::Completed, at(8, 8)).with_units(dec("1")),
        ];
        let buckets = rollup(&txs, &TransactionFilter::default(), Granularity::Weekly, offset);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "2024-W01");
        assert_eq!(buckets[0].transaction_count, 2);
        assert_eq!(buckets[0].start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(buckets[0].end, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(buckets[1].label, "2024-W02");
    }

    #[test]
    fn test_usage_statistics() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let txs = vec![
            tx("T1", "10", TransactionStatus::Completed, at(1, 8)).with_units(dec("30")),
            tx("T2", "10", TransactionStatus::Completed, at(2, 8)).with_units(dec("40")),
            tx("T3", "10", TransactionStatus::Completed, at(3, 8)).with_units(dec("40")),
        ];
        let buckets = rollup(&txs, &TransactionFilter::default(), Granularity::Daily, offset);
        let stats = usage_statistics(&buckets);

        assert_eq!(stats.bucket_count, 3);
        assert_eq!(stats.total_units, dec("110"));
        assert_eq!(stats.peak, Some(("2024-01-02".to_string(), dec("40"))));

        let empty = usage_statistics(&[]);
        assert_eq!(empty.average_units_per_bucket, dec("0"));
        assert!(empty.peak.is_none());
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("weekly".parse::<Granularity>().unwrap(), Granularity::Weekly);
        assert_eq!("Day".parse::<Granularity>().unwrap(), Granularity::Daily);
        assert!("monthly".parse::<Granularity>().is_err());
    }
}
