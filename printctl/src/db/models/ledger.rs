//! Database models for the balance ledger.

use crate::pricing::PageUnits;
use crate::types::{PrintJobId, StudentId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Why a balance moved, stored as TEXT in database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerReason {
    /// Print job settled
    Debit,
    /// Top-up completed
    Credit,
    /// Pending print job cancelled
    Refund,
}

/// One balance mutation. Exactly one of `print_job_id` and `transaction_id` is set.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LedgerEntryDBResponse {
    pub id: i64,
    pub student_id: StudentId,
    pub delta: PageUnits,
    pub balance_after: PageUnits,
    pub print_job_id: Option<PrintJobId>,
    pub transaction_id: Option<TransactionId>,
    pub reason: LedgerReason,
    pub created_at: DateTime<Utc>,
}
