pub mod rate;
pub mod session;
pub mod transaction;

pub use rate::Rate;
pub use session::Session;
pub use transaction::{apply_refund, RefundDetails, RefundRequest, Transaction, TransactionStatus};

use serde::{Deserialize, Serialize};

/// A registered meter a purchase can be credited to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: String,
    pub location: String,
}

impl Meter {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}
