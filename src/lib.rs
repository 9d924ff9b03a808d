pub mod adapters;
pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod ports;
pub mod services;
pub mod use_cases;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::{BillingError, BillingResult};
