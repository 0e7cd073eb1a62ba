//! Caller-side policies composed around pipeline calls

mod retry;

pub use retry::RetryPolicy;
