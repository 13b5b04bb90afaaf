//! Policy abstractions for dispatch operations.
//!
//! - [`RetryPolicy`]: how often and how patiently a single provider is retried

pub mod retry;

pub use retry::RetryPolicy;
