//! Observability
//!
//! Counters for fetch execution and change delivery. Logging goes through
//! `tracing`; this crate never installs a subscriber.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use livefetch::observability::MetricsRegistry;
//!
//! let metrics = Arc::new(MetricsRegistry::new());
//! metrics.increment_fetches_executed();
//! assert_eq!(metrics.snapshot().fetches_executed, 1);
//! ```

mod metrics;

pub use metrics::{MetricsRegistry, MetricsSnapshot};
