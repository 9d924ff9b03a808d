pub mod http_backend;
pub mod in_memory;

pub use http_backend::{BackendError, HttpBillingBackend};
pub use in_memory::InMemoryBackend;
