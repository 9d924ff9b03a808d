pub mod aggregator;
pub mod calculator;

pub use aggregator::{
    rollup, summarize, usage_statistics, BillingSummary, Breakdown, DateRange, Granularity,
    TransactionFilter, UsageBucket, UsageStatistics,
};
pub use calculator::{
    compute_purchase, parse_amount, PurchaseCalculator, PurchasePolicy, PurchaseRequest,
    PurchaseResult, UnitRounding,
};
