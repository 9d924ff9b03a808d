use csv::Writer;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Transaction;
use crate::services::aggregator::{BillingSummary, UsageBucket};
use crate::validation::payment_method_name;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// CSV row representation - uses String for amounts to avoid Serialize issues with BigDecimal
#[derive(Serialize)]
struct TransactionCsvRow {
    id: String,
    timestamp: String,
    user: String,
    device_id: String,
    amount: String,
    units_purchased: String,
    payment_method: String,
    status: String,
    refund_amount: String,
    notes: String,
}

impl From<&Transaction> for TransactionCsvRow {
    fn from(tx: &Transaction) -> Self {
        TransactionCsvRow {
            id: tx.id.clone(),
            timestamp: tx.timestamp.to_rfc3339(),
            user: tx.user.clone().unwrap_or_default(),
            device_id: tx.device_id.clone(),
            amount: tx.amount.to_string(),
            units_purchased: tx
                .units_purchased
                .as_ref()
                .map(|units| units.to_string())
                .unwrap_or_default(),
            payment_method: tx.payment_method.clone(),
            status: tx.status.to_string(),
            refund_amount: tx
                .refund
                .as_ref()
                .map(|refund| refund.amount.to_string())
                .unwrap_or_default(),
            notes: tx.notes.clone().unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct SummaryCsvRow {
    section: &'static str,
    key: String,
    count: u64,
    amount: String,
}

#[derive(Serialize)]
struct UsageCsvRow {
    label: String,
    start: String,
    end: String,
    transactions: u64,
    units: String,
    cost: String,
    average_price: String,
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

pub fn transactions_csv(transactions: &[Transaction]) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());
    for tx in transactions {
        writer.serialize(TransactionCsvRow::from(tx))?;
    }
    finish(writer)
}

/// Summary as CSV. Every figure is read from `summary`; nothing is recomputed.
pub fn summary_csv(summary: &BillingSummary) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());

    writer.serialize(SummaryCsvRow {
        section: "total",
        key: "all".to_string(),
        count: summary.total_transactions,
        amount: summary.total_amount.to_string(),
    })?;
    writer.serialize(SummaryCsvRow {
        section: "average",
        key: "all".to_string(),
        count: summary.total_transactions,
        amount: summary.average_amount.to_string(),
    })?;
    writer.serialize(SummaryCsvRow {
        section: "units",
        key: "all".to_string(),
        count: summary.total_transactions,
        amount: summary.total_units.to_string(),
    })?;

    for (status, breakdown) in &summary.breakdown_by_status {
        writer.serialize(SummaryCsvRow {
            section: "status",
            key: status.to_string(),
            count: breakdown.count,
            amount: breakdown.amount.to_string(),
        })?;
    }

    for (method, breakdown) in &summary.breakdown_by_payment_method {
        writer.serialize(SummaryCsvRow {
            section: "payment_method",
            key: method.clone(),
            count: breakdown.count,
            amount: breakdown.amount.to_string(),
        })?;
    }

    finish(writer)
}

pub fn usage_csv(buckets: &[UsageBucket]) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());
    for bucket in buckets {
        writer.serialize(UsageCsvRow {
            label: bucket.label.clone(),
            start: bucket.start.to_string(),
            end: bucket.end.to_string(),
            transactions: bucket.transaction_count,
            units: bucket.total_units.to_string(),
            cost: bucket.total_cost.to_string(),
            average_price: bucket
                .average_price
                .as_ref()
                .map(|price| price.to_string())
                .unwrap_or_default(),
        })?;
    }
    finish(writer)
}

/// Plain-text receipt for a single transaction.
pub fn receipt(tx: &Transaction) -> String {
    let mut lines = vec![
        "ELECTRICITY PURCHASE RECEIPT".to_string(),
        "=".repeat(32),
        format!("Transaction ID: {}", tx.id),
        format!("Date:           {}", tx.timestamp.format("%Y-%m-%d %H:%M:%S UTC")),
    ];

    if let Some(user) = &tx.user {
        lines.push(format!("Customer:       {}", user));
    }
    if !tx.device_id.is_empty() {
        lines.push(format!("Meter:          {}", tx.device_id));
    }

    lines.push(format!("Amount:         {}", tx.amount));
    if let Some(units) = &tx.units_purchased {
        lines.push(format!("Units:          {} kWh", units));
    }
    if let Some(price) = tx.unit_price() {
        lines.push(format!("Price per unit: {}", price.with_scale(2)));
    }
    lines.push(format!(
        "Payment method: {}",
        payment_method_name(&tx.payment_method)
    ));
    lines.push(format!("Status:         {}", tx.status));

    if let Some(refund) = &tx.refund {
        lines.push(format!(
            "Refunded:       {} on {} ({})",
            refund.amount,
            refund.date.format("%Y-%m-%d"),
            refund.reason
        ));
    }

    lines.push("=".repeat(32));
    lines.push("Thank you for your purchase!".to_string());
    lines.join("\n")
}
