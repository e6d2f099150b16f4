//! Database models for wallet top-up transactions.

use crate::pricing::PageUnits;
use crate::types::{StudentId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Transaction status stored as TEXT in database.
///
/// `Pending -> Completed | Failed` happens here; `Refunded` is set by administrative tooling and is
/// treated as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

/// Database request for opening a pending top-up
#[derive(Debug, Clone)]
pub struct TransactionCreateDBRequest {
    pub student_id: StudentId,
    pub amount: Decimal,
    pub pages: PageUnits,
    pub payment_method: String,
    /// Payment code the student quotes in the transfer description
    pub reference: String,
}

/// Database response for a transaction
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TransactionDBResponse {
    pub id: TransactionId,
    pub student_id: StudentId,
    pub amount: Decimal,
    pub pages: PageUnits,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub reference: String,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for applying a confirmed payment
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub student_id: StudentId,
    pub pages: PageUnits,
    pub reference: String,
    pub gateway_transaction_id: Option<String>,
}

/// Result of [`crate::storage::Storage::credit`].
#[derive(Debug, Clone)]
pub struct CreditOutcome {
    /// `false` when the reference had already been completed
    pub applied: bool,
    pub balance: PageUnits,
    pub transaction: TransactionDBResponse,
}
