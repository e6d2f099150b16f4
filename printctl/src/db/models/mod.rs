//! Records shared by every storage backend.
//!
//! Each `*DBResponse` struct matches a table row and derives `sqlx::FromRow`, so the Postgres
//! backend can read rows straight into it while the in-memory backend builds the same values by
//! hand. `*CreateDBRequest` structs carry what the caller supplies for an insert.
//!
//! - [`documents`]: uploaded documents and their set-once page counts
//! - [`print_jobs`]: settled print jobs
//! - [`balances`]: per-student page balances
//! - [`transactions`]: wallet top-ups awaiting or having received payment
//! - [`ledger`]: the audit trail of every balance mutation

pub mod balances;
pub mod documents;
pub mod ledger;
pub mod print_jobs;
pub mod transactions;
