//! The balance ledger.
//!
//! [`Storage`] is the only place balances change. Every mutation runs as one unit of work that
//! also writes exactly one [`LedgerEntryDBResponse`], so the ledger always explains the balance.
//!
//! Two backends implement it:
//!
//! - [`postgres::PostgresStorage`]: the production store. Debits are a conditional
//!   `UPDATE ... WHERE balance >= cost`, which takes the row lock and serialises concurrent
//!   debits for the same student.
//! - [`in_memory::InMemoryStorage`]: a single mutex over all state, for tests and single-process
//!   runs. Lost on restart.
//!
//! Students without a balance row are provisioned lazily from the configured
//! [`BalancePolicy`] the first time they are read, debited or credited.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::errors::DbError;
use crate::db::models::{
    balances::PageBalanceDBResponse,
    documents::{DocumentCreateDBRequest, DocumentDBResponse},
    ledger::LedgerEntryDBResponse,
    print_jobs::{PrintJobCreateDBRequest, PrintJobDBResponse},
    transactions::{CreditOutcome, CreditRequest, TransactionCreateDBRequest, TransactionDBResponse},
};
use crate::pricing::PageUnits;
use crate::types::{DocumentId, PrintJobId, StudentId};

pub use crate::db::models::balances::BalancePolicy;

pub mod in_memory;
pub mod postgres;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("insufficient balance: {required} page units required, {available} available")]
    InsufficientBalance { required: PageUnits, available: PageUnits },

    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(DbError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Transactional store for documents, print jobs, balances and top-ups.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Register a document stored by the upload receiver.
    async fn register_document(&self, request: DocumentCreateDBRequest) -> Result<DocumentDBResponse>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentDBResponse>>;

    /// Record a document's page count and normalized PDF path, at most once.
    ///
    /// Returns the stored document. If another caller recorded first, their values are kept and
    /// returned unchanged.
    ///
    /// # Errors
    /// - `NotFound` if the document does not exist
    async fn record_page_count(&self, id: DocumentId, page_count: i32, normalized_path: &str) -> Result<DocumentDBResponse>;

    /// Current balance, provisioning the row if the student has none.
    async fn balance(&self, student_id: StudentId) -> Result<PageBalanceDBResponse>;

    /// Create a PENDING print job and debit its cost, atomically.
    ///
    /// # Errors
    /// - `InsufficientBalance` if the balance does not cover the cost. Nothing is written.
    async fn debit(&self, request: PrintJobCreateDBRequest) -> Result<PrintJobDBResponse>;

    async fn get_print_job(&self, id: PrintJobId) -> Result<Option<PrintJobDBResponse>>;

    /// A student's print jobs, newest first.
    async fn list_print_jobs(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<PrintJobDBResponse>>;

    /// Cancel a PENDING print job and refund its cost, atomically.
    ///
    /// # Errors
    /// - `NotFound` if the job does not exist or belongs to another student
    /// - `InvalidTransition` if the job is no longer PENDING
    async fn cancel_print_job(&self, student_id: StudentId, id: PrintJobId) -> Result<PrintJobDBResponse>;

    /// Open a PENDING top-up transaction.
    ///
    /// # Errors
    /// - `Database(UniqueViolation)` if the reference is already taken
    async fn open_transaction(&self, request: TransactionCreateDBRequest) -> Result<TransactionDBResponse>;

    /// Look up a transaction by its external reference.
    async fn find_transaction(&self, reference: &str) -> Result<Option<TransactionDBResponse>>;

    /// A student's transactions, newest first.
    async fn list_transactions(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<TransactionDBResponse>>;

    /// Complete a PENDING transaction and credit its pages, atomically.
    ///
    /// Crediting a reference that is already COMPLETED is a successful no-op with
    /// `applied: false`.
    ///
    /// # Errors
    /// - `NotFound` if no transaction has this reference
    /// - `Conflict` if the transaction belongs to another student or has a different page count
    /// - `InvalidTransition` if the transaction is FAILED or REFUNDED
    async fn credit(&self, request: CreditRequest) -> Result<CreditOutcome>;

    /// Move a PENDING transaction to FAILED. Returns whether the transition happened.
    async fn fail_transaction(&self, reference: &str, reason: &str) -> Result<bool>;

    /// Every ledger entry of a student, oldest first.
    async fn ledger_entries(&self, student_id: StudentId) -> Result<Vec<LedgerEntryDBResponse>>;
}
