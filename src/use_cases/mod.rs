pub mod build_report;
pub mod purchase_electricity;

pub use build_report::{build_report, BillingReport, BuildReport};
pub use purchase_electricity::{PurchaseElectricity, PurchaseInput, PurchaseOutput, Quote};
