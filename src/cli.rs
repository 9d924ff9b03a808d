use anyhow::Context;
use bigdecimal::BigDecimal;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::adapters::http_backend::WireTransaction;
use crate::adapters::{HttpBillingBackend, InMemoryBackend};
use crate::chat::{ChatAssistant, KeywordClassifier};
use crate::config::Config;
use crate::domain::{Meter, Rate, Session, Transaction, TransactionStatus};
use crate::export;
use crate::ports::{BillingBackend, RateLookup};
use crate::services::aggregator::{DateRange, Granularity, TransactionFilter};
use crate::services::calculator::parse_amount;
use crate::use_cases::{BillingReport, BuildReport, PurchaseElectricity, PurchaseInput};
use crate::utils::pagination::{paginate, DEFAULT_PAGE_SIZE};
use crate::utils::timestamp::parse_date;
use crate::validation::payment_method_name;

#[derive(Parser)]
#[command(name = "meterpay")]
#[command(about = "MeterPay - electricity prepayment billing core", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Price an amount at the active rate without buying
    Quote {
        /// Amount to spend, e.g. "10,000" or "$25"
        #[arg(value_name = "AMOUNT")]
        amount: String,
    },

    /// Buy electricity units for a meter
    Buy {
        #[arg(value_name = "AMOUNT")]
        amount: String,

        /// Meter to credit
        #[arg(short, long)]
        device: String,

        /// Payment method (credit, debit, paypal, bank)
        #[arg(short, long, default_value = "credit")]
        method: String,
    },

    /// Billing summary over the filtered transactions
    Summary {
        #[command(flatten)]
        filter: FilterArgs,

        /// Page of the transaction list to show
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },

    /// Daily or weekly usage rollup
    Usage {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(short, long, default_value = "daily")]
        granularity: String,
    },

    /// Export transactions, the summary, the usage rollup or a receipt
    Export {
        #[arg(value_enum)]
        kind: ExportKind,

        #[command(flatten)]
        filter: FilterArgs,

        /// Transaction id, required for receipts
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long, default_value = "daily")]
        granularity: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive purchase assistant
    Chat {
        /// Registered meter as ID=LOCATION; repeatable
        #[arg(long = "meter", value_name = "ID=LOCATION")]
        meters: Vec<String>,
    },

    /// Configuration validation
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Transactions,
    Summary,
    Usage,
    Receipt,
}

/// Where rates and transactions come from. Any offline flag switches to the
/// in-memory backend.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read transactions from a JSON file instead of the backend
    #[arg(long, global = true, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Price per unit to use instead of the backend's active rate
    #[arg(long, global = true, value_name = "PRICE")]
    pub rate: Option<String>,

    #[arg(long, global = true, default_value = "1")]
    pub user_id: String,

    #[arg(long, global = true, default_value = "customer")]
    pub username: String,

    /// Act as an administrator (all users' transactions)
    #[arg(long, global = true)]
    pub admin: bool,
}

impl SourceArgs {
    fn is_offline(&self) -> bool {
        self.input.is_some() || self.rate.is_some()
    }

    pub fn session(&self, config: &Config) -> Session {
        let session = if self.admin {
            Session::admin(self.user_id.clone(), self.username.clone())
        } else {
            Session::new(self.user_id.clone(), self.username.clone())
        };
        match &config.api_token {
            Some(token) => session.with_token(token.clone()),
            None => session,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// completed, pending, failed or refunded
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long = "payment-method")]
    pub payment_method: Option<String>,

    /// First day, YYYY-MM-DD (inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// Last day, YYYY-MM-DD (inclusive)
    #[arg(long)]
    pub to: Option<String>,

    /// Search over id, user and amount
    #[arg(long)]
    pub search: Option<String>,

    #[arg(long)]
    pub min_amount: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self, config: &Config) -> anyhow::Result<TransactionFilter> {
        let mut filter = TransactionFilter::default();

        if let Some(status) = &self.status {
            filter = filter.with_status(TransactionStatus::from_str(status)?);
        }
        if let Some(method) = &self.payment_method {
            filter = filter.with_payment_method(method.clone());
        }

        let from = self
            .from
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(|e| anyhow::anyhow!("--from: {}", e))?;
        let to = self
            .to
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(|e| anyhow::anyhow!("--to: {}", e))?;
        if from.is_some() || to.is_some() {
            filter = filter.with_date_range(DateRange::between_dates(from, to, config.reporting_offset));
        }

        if let Some(search) = &self.search {
            filter = filter.with_search(search.clone());
        }
        if let Some(min_amount) = &self.min_amount {
            filter = filter.with_min_amount(parse_amount(min_amount)?);
        }

        Ok(filter)
    }
}

/// Rate lookup and billing backend for this invocation.
pub struct Backends {
    pub rates: Arc<dyn RateLookup>,
    pub billing: Arc<dyn BillingBackend>,
}

pub fn build_backends(config: &Config, source: &SourceArgs) -> anyhow::Result<Backends> {
    if !source.is_offline() {
        tracing::info!(backend_url = %config.backend_url, "Using HTTP billing backend");
        let http = Arc::new(HttpBillingBackend::from_config(config));
        return Ok(Backends {
            rates: http.clone(),
            billing: http,
        });
    }

    let transactions = match &source.input {
        Some(path) => load_transactions(path)?,
        None => Vec::new(),
    };
    let rate = source
        .rate
        .as_deref()
        .map(|price| {
            BigDecimal::from_str(price.trim())
                .map(|price| Rate::new("Offline", price))
                .with_context(|| format!("--rate must be a decimal, got '{}'", price))
        })
        .transpose()?;

    tracing::info!(transactions = transactions.len(), "Using in-memory billing backend");
    let memory = Arc::new(InMemoryBackend::new(rate, transactions));
    Ok(Backends {
        rates: memory.clone(),
        billing: memory,
    })
}

/// A JSON array of transactions as the backend returns them.
pub fn load_transactions(path: &Path) -> anyhow::Result<Vec<Transaction>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rows: Vec<WireTransaction> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid transaction JSON in {}", path.display()))?;
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            row.into_domain()
                .with_context(|| format!("Invalid transaction #{} in {}", index + 1, path.display()))
        })
        .collect()
}

fn purchase_use_case(config: &Config, backends: &Backends) -> anyhow::Result<PurchaseElectricity> {
    Ok(PurchaseElectricity::new(
        backends.rates.clone(),
        backends.billing.clone(),
        config.purchase_policy()?,
    ))
}

async fn report(
    config: &Config,
    source: &SourceArgs,
    filter: &FilterArgs,
    granularity: Granularity,
) -> anyhow::Result<BillingReport> {
    let backends = build_backends(config, source)?;
    let filter = filter.to_filter(config)?;
    let report = BuildReport::new(backends.billing, config.reporting_offset)
        .execute(&source.session(config), &filter, granularity)
        .await?;
    Ok(report)
}

pub async fn handle_quote(config: &Config, source: &SourceArgs, amount: &str) -> anyhow::Result<()> {
    let backends = build_backends(config, source)?;
    let amount = parse_amount(amount)?;
    let quote = purchase_use_case(config, &backends)?.quote(&amount).await?;

    println!("Quote ({}):", quote.rate.name);
    println!("  Amount:         {}", quote.result.amount_tendered);
    println!("  Price per unit: {}", quote.result.price_per_unit);
    println!("  Units:          {}", quote.result.units_purchased);
    println!("  Fee:            {}", quote.result.fee_amount);
    println!("  Net amount:     {}", quote.result.net_amount);

    Ok(())
}

pub async fn handle_buy(
    config: &Config,
    source: &SourceArgs,
    amount: &str,
    device: &str,
    method: &str,
) -> anyhow::Result<()> {
    let backends = build_backends(config, source)?;
    let input = PurchaseInput {
        amount: parse_amount(amount)?,
        device_id: device.to_string(),
        payment_method: method.to_string(),
    };

    let output = purchase_use_case(config, &backends)?
        .execute(&source.session(config), input)
        .await?;

    println!("✓ Purchase completed");
    println!("  Transaction ID: {}", output.transaction.id);
    println!("  Meter:          {}", output.transaction.device_id);
    println!("  Units:          {}", output.quote.result.units_purchased);
    println!(
        "  Payment method: {}",
        payment_method_name(&output.transaction.payment_method)
    );

    Ok(())
}

pub async fn handle_summary(
    config: &Config,
    source: &SourceArgs,
    filter: &FilterArgs,
    page: usize,
    page_size: usize,
) -> anyhow::Result<()> {
    let report = report(config, source, filter, Granularity::Daily).await?;
    let summary = &report.summary;

    println!("Billing summary:");
    println!("  Transactions:   {}", summary.total_transactions);
    println!("  Total amount:   {}", summary.total_amount);
    println!("  Total units:    {}", summary.total_units);
    println!("  Average amount: {}", summary.average_amount.with_scale(2));

    println!("By status:");
    for (status, breakdown) in &summary.breakdown_by_status {
        println!("  {:<12} {:>6} {:>14}", status, breakdown.count, breakdown.amount);
    }
    println!("By payment method:");
    for (method, breakdown) in &summary.breakdown_by_payment_method {
        println!("  {:<14} {:>4} {:>14}", payment_method_name(method), breakdown.count, breakdown.amount);
    }

    let page = paginate(&report.transactions, page, page_size);
    println!(
        "Transactions (page {} of {}, {} total):",
        page.page,
        page.total_pages.max(1),
        page.total_items
    );
    println!("{:<40} {:<20} {:>12} {:<10}", "ID", "Date", "Amount", "Status");
    println!("{}", "-".repeat(85));
    for tx in &page.items {
        println!(
            "{:<40} {:<20} {:>12} {:<10}",
            tx.id,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.amount.to_string(),
            tx.status
        );
    }

    Ok(())
}

pub async fn handle_usage(
    config: &Config,
    source: &SourceArgs,
    filter: &FilterArgs,
    granularity: &str,
) -> anyhow::Result<()> {
    let granularity = Granularity::from_str(granularity)?;
    let report = report(config, source, filter, granularity).await?;

    if report.buckets.is_empty() {
        println!("No usage in the selected period");
        return Ok(());
    }

    println!("{:<12} {:>6} {:>14} {:>14} {:>12}", "Period", "Txns", "Units", "Cost", "Avg price");
    println!("{}", "-".repeat(62));
    for bucket in &report.buckets {
        println!(
            "{:<12} {:>6} {:>14} {:>14} {:>12}",
            bucket.label,
            bucket.transaction_count,
            bucket.total_units.with_scale(2).to_string(),
            bucket.total_cost.to_string(),
            bucket
                .average_price
                .as_ref()
                .map(|price| price.with_scale(2).to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let stats = &report.statistics;
    println!("Average units per period: {}", stats.average_units_per_bucket.with_scale(2));
    if let Some((label, units)) = &stats.peak {
        println!("Highest usage: {} ({} units)", label, units.with_scale(2));
    }

    Ok(())
}

pub async fn handle_export(
    config: &Config,
    source: &SourceArgs,
    kind: ExportKind,
    filter: &FilterArgs,
    id: Option<&str>,
    granularity: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let granularity = Granularity::from_str(granularity)?;
    let report = report(config, source, filter, granularity).await?;

    let content = match kind {
        ExportKind::Transactions => export::transactions_csv(&report.transactions)?,
        ExportKind::Summary => export::summary_csv(&report.summary)?,
        ExportKind::Usage => export::usage_csv(&report.buckets)?,
        ExportKind::Receipt => {
            let id = id.context("--id is required for receipts")?;
            let tx = report
                .transactions
                .iter()
                .find(|tx| tx.id == id)
                .with_context(|| format!("Transaction {} not found", id))?;
            export::receipt(tx)
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), kind = ?kind, "Export written");
            println!("✓ Export written to {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

/// `ID=LOCATION` pairs; a bare id gets a placeholder location.
const DEFAULT_METER_LOCATION: &str = "Registered meter";

/// `ID=Location` pairs; a bare or empty location falls back to a placeholder.
pub fn parse_meters(values: &[String]) -> Vec<Meter> {
    values
        .iter()
        .filter_map(|value| {
            let (id, location) = value.split_once('=').unwrap_or((value.as_str(), ""));
            let (id, location) = (id.trim(), location.trim());
            if id.is_empty() {
                return None;
            }
            let location = if location.is_empty() { DEFAULT_METER_LOCATION } else { location };
            Some(Meter::new(id, location))
        })
        .collect()
}

/// Distinct meters in the caller's history. A failed fetch is logged and yields none.
pub async fn meters_from_history(billing: &dyn BillingBackend, session: &Session) -> Vec<Meter> {
    let history = match billing.transactions(session).await {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, kind = e.kind(), user_id = %session.user_id, "Could not load meters from history");
            return Vec::new();
        }
    };

    let ids: BTreeSet<String> = history
        .into_iter()
        .map(|tx| tx.device_id)
        .filter(|id| !id.is_empty())
        .collect();
    ids.into_iter()
        .map(|id| Meter::new(id, DEFAULT_METER_LOCATION))
        .collect()
}

pub async fn handle_chat(config: &Config, source: &SourceArgs, meters: &[String]) -> anyhow::Result<()> {
    let backends = build_backends(config, source)?;
    let session = source.session(config);

    let mut meters = parse_meters(meters);
    if meters.is_empty() {
        meters = meters_from_history(backends.billing.as_ref(), &session).await;
    }

    let purchases = Arc::new(purchase_use_case(config, &backends)?);
    let mut assistant = ChatAssistant::new(session, meters, purchases, Box::new(KeywordClassifier));
    assistant.refresh_rate().await;

    println!("{}", assistant.greeting());
    println!("(type \"exit\" to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }
        println!("{}", assistant.send(line).await);
    }

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Backend URL: {}", config.backend_url);
    println!(
        "  API Token: {}",
        config.api_token.as_deref().map(mask_secret).unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  Fee Percentage: {}", config.fee_percentage);
    println!("  Unit Rounding: {:?}", config.unit_rounding);
    println!("  Reporting Offset: {}", config.reporting_offset);
    println!("  Request Timeout: {}s", config.request_timeout_secs);
    println!(
        "  Circuit Breaker: opens after {} failures, resets after {}s",
        config.circuit_failure_threshold, config.circuit_reset_timeout_secs
    );

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        return "****".to_string();
    }
    format!("{}****", visible)
}
