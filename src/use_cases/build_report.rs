//! Billing report use case: fetch, filter, summarize and bucket.

use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{Session, Transaction};
use crate::error::BillingResult;
use crate::ports::BillingBackend;
use crate::services::aggregator::{
    rollup, summarize, usage_statistics, BillingSummary, Granularity, TransactionFilter,
    UsageBucket, UsageStatistics,
};

#[derive(Debug, Clone, Serialize)]
pub struct BillingReport {
    pub summary: BillingSummary,
    pub buckets: Vec<UsageBucket>,
    pub statistics: UsageStatistics,
    /// Matching transactions, newest first.
    pub transactions: Vec<Transaction>,
}

/// Build a report from an already fetched collection.
pub fn build_report(
    transactions: &[Transaction],
    filter: &TransactionFilter,
    granularity: Granularity,
    offset: FixedOffset,
) -> BillingReport {
    let summary = summarize(transactions, filter);
    let buckets = rollup(transactions, filter, granularity, offset);
    let statistics = usage_statistics(&buckets);

    let mut matching: Vec<Transaction> = filter.apply(transactions).into_iter().cloned().collect();
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

    BillingReport {
        summary,
        buckets,
        statistics,
        transactions: matching,
    }
}

pub struct BuildReport {
    backend: Arc<dyn BillingBackend>,
    offset: FixedOffset,
}

impl BuildReport {
    pub fn new(backend: Arc<dyn BillingBackend>, offset: FixedOffset) -> Self {
        Self { backend, offset }
    }

    pub async fn execute(
        &self,
        session: &Session,
        filter: &TransactionFilter,
        granularity: Granularity,
    ) -> BillingResult<BillingReport> {
        let transactions = self.backend.transactions(session).await?;
        let report = build_report(&transactions, filter, granularity, self.offset);

        tracing::info!(
            user_id = %session.user_id,
            fetched = transactions.len(),
            matched = report.summary.total_transactions,
            buckets = report.buckets.len(),
            "Billing report built"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionStatus;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_report_orders_newest_first() {
        let older = Transaction::new(
            "T1",
            BigDecimal::from(10),
            TransactionStatus::Completed,
            "credit",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        let newer = Transaction::new(
            "T2",
            BigDecimal::from(20),
            TransactionStatus::Completed,
            "credit",
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        let report = build_report(
            &[older, newer],
            &TransactionFilter::default(),
            Granularity::Daily,
            FixedOffset::east_opt(0).unwrap(),
        );

        assert_eq!(report.transactions[0].id, "T2");
        assert_eq!(report.summary.total_amount, BigDecimal::from(30));
        assert_eq!(report.buckets.len(), 2);
    }
}
