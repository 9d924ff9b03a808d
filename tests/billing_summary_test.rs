use bigdecimal::BigDecimal;
use chrono::{FixedOffset, TimeZone, Utc};
use std::str::FromStr;
use std::sync::Arc;

use meterpay_core::adapters::InMemoryBackend;
use meterpay_core::domain::{Session, Transaction, TransactionStatus};
use meterpay_core::services::aggregator::{
    summarize, DateRange, Granularity, TransactionFilter,
};
use meterpay_core::use_cases::BuildReport;

fn tx(id: &str, amount: i64, status: TransactionStatus, method: &str, day: u32, hour: u32) -> Transaction {
    Transaction::new(
        id,
        BigDecimal::from(amount),
        status,
        method,
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
    )
}

fn history() -> Vec<Transaction> {
    vec![
        tx("TXN-1", 1000, TransactionStatus::Completed, "credit", 4, 8)
            .with_units(BigDecimal::from(10))
            .with_user("7", Some("jane".to_string())),
        tx("TXN-2", 500, TransactionStatus::Completed, "paypal", 4, 22)
            .with_units(BigDecimal::from(5))
            .with_user("7", Some("jane".to_string())),
        tx("TXN-3", 300, TransactionStatus::Failed, "credit", 6, 12)
            .with_user("8", Some("john".to_string())),
        tx("TXN-4", 2000, TransactionStatus::Completed, "bank", 12, 9)
            .with_units(BigDecimal::from(25))
            .with_user("8", Some("john".to_string())),
    ]
}

#[test]
fn test_two_transaction_breakdown() {
    let transactions = vec![
        tx("A", 100, TransactionStatus::Completed, "credit", 1, 0),
        tx("B", 50, TransactionStatus::Failed, "credit", 1, 1),
    ];
    let summary = summarize(&transactions, &TransactionFilter::default());

    assert_eq!(summary.total_transactions, 2);
    assert_eq!(summary.total_amount, BigDecimal::from(150));
    assert_eq!(summary.average_amount, BigDecimal::from(75));
    assert_eq!(summary.breakdown_by_status[&TransactionStatus::Completed].amount, BigDecimal::from(100));
    assert_eq!(summary.breakdown_by_status[&TransactionStatus::Failed].count, 1);
    assert_eq!(summary.breakdown_by_payment_method["credit"].count, 2);
}

#[test]
fn test_summary_ignores_input_order() {
    let mut reversed = history();
    reversed.reverse();
    let filter = TransactionFilter::default().with_status(TransactionStatus::Completed);

    let summary = summarize(&history(), &filter);
    assert_eq!(summary, summarize(&reversed, &filter));
    assert_eq!(summary.total_units, BigDecimal::from(40));
    assert_eq!(summary.total_amount, BigDecimal::from(3500));
}

#[test]
fn test_date_range_uses_reporting_offset() {
    // 22:00 UTC on the 4th is already the 5th at +03:00
    let offset = FixedOffset::east_opt(3 * 3600).unwrap();
    let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let filter = TransactionFilter::default().with_date_range(DateRange::between_dates(
        Some(day),
        Some(day),
        offset,
    ));

    let summary = summarize(&history(), &filter);
    assert_eq!(summary.total_transactions, 1);
    assert_eq!(summary.total_amount, BigDecimal::from(1000));
}

#[test]
fn test_search_and_min_amount() {
    let filter = TransactionFilter::default()
        .with_search("JOHN")
        .with_min_amount(BigDecimal::from_str("1000").unwrap());

    let summary = summarize(&history(), &filter);
    assert_eq!(summary.total_transactions, 1);
    assert_eq!(summary.total_amount, BigDecimal::from(2000));
}

#[tokio::test]
async fn test_report_scopes_to_caller() {
    let backend = InMemoryBackend::new(None, history());
    let use_case = BuildReport::new(Arc::new(backend), FixedOffset::east_opt(0).unwrap());

    let own = use_case
        .execute(&Session::new("7", "jane"), &TransactionFilter::default(), Granularity::Daily)
        .await
        .unwrap();
    assert_eq!(own.summary.total_transactions, 2);
    assert_eq!(own.buckets.len(), 1);

    let all = use_case
        .execute(&Session::admin("1", "admin"), &TransactionFilter::default(), Granularity::Weekly)
        .await
        .unwrap();
    assert_eq!(all.summary.total_transactions, 4);
    assert_eq!(all.buckets.len(), 2);
    assert_eq!(all.buckets[0].label, "2024-W10");
    assert_eq!(all.statistics.peak.as_ref().map(|(label, _)| label.as_str()), Some("2024-W11"));
    assert_eq!(all.transactions[0].id, "TXN-4");
}

#[tokio::test]
async fn test_report_fails_when_backend_offline() {
    let backend = InMemoryBackend::new(None, history());
    backend.set_offline(true).await;
    let use_case = BuildReport::new(Arc::new(backend), FixedOffset::east_opt(0).unwrap());

    let result = use_case
        .execute(&Session::new("7", "jane"), &TransactionFilter::default(), Granularity::Daily)
        .await;
    assert!(result.is_err());
}
