//! Database layer for the print ledger.
//!
//! - [`models`]: records shared by every [`crate::storage::Storage`] backend
//! - [`errors`]: sqlx error categorisation
//!
//! Queries live next to the Postgres backend in [`crate::storage::postgres`]; the schema is in
//! `migrations/` and is applied at startup through [`crate::migrator`].

pub mod errors;
pub mod models;
