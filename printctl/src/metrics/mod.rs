//! Prometheus metrics for settlement and reconciliation.
//!
//! Instruments are created against a [`prometheus::Registry`] owned by the application and
//! exposed at `/internal/metrics` when `enable_metrics` is set.

mod ledger;

pub use ledger::LedgerMetrics;
