//! Resilience patterns for event delivery
//!
//! Currently provides:
//! - **Retry**: Exponential backoff with jitter for transient failures
//!
//! # Example: Publish with Retry
//!
//! ```rust,no_run
//! use resilience::{with_retry, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RetryConfig::default();
//!
//!     let result = with_retry(&config, || async {
//!         // Your publish call here
//!         Ok::<_, String>(())
//!     })
//!     .await;
//! }
//! ```

pub mod retry;

pub use retry::{with_retry, RetryConfig, RetryError};
