//! API request and response models.

pub mod balances;
pub mod documents;
pub mod pagination;
pub mod payments;
pub mod print_jobs;
pub mod transactions;
