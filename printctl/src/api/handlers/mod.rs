//! HTTP request handlers.
//!
//! - [`print_jobs`]: print-job settlement, listing and cancellation
//! - [`balances`]: the caller's page balance
//! - [`transactions`]: opening and listing wallet top-ups
//! - [`payments`]: the payment gateway webhook
//! - [`documents`]: registration of stored uploads by the upload receiver
//!
//! Student-facing handlers take a [`crate::auth::CurrentStudent`] and only ever touch that
//! student's data.

pub mod balances;
pub mod documents;
pub mod payments;
pub mod print_jobs;
pub mod transactions;
