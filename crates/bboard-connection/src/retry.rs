//! Retry with exponential backoff
//!
//! [`retry_with_backoff`] is independent of any I/O: the acquisition
//! coordinator wraps its take-probe-replace sequence in it, and anything
//! else that needs "try N times, doubling the wait" can use it too.

mod backoff;
mod retry;


pub use backoff::BackoffStrategy;
pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
