//! API request/response models for wallet top-ups.

use crate::db::models::transactions::{TransactionDBResponse, TransactionStatus};
use crate::pricing::PageUnits;
use crate::types::{StudentId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopUpCreate {
    /// Page units to buy
    pub pages: PageUnits,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub student_id: StudentId,
    /// Amount to transfer (returned as string to preserve precision)
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub pages: PageUnits,
    pub status: TransactionStatus,
    pub payment_method: String,
    /// Payment code to include in the transfer description
    pub reference: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionDBResponse> for TransactionResponse {
    fn from(db: TransactionDBResponse) -> Self {
        Self {
            id: db.id,
            student_id: db.student_id,
            amount: db.amount,
            pages: db.pages,
            status: db.status,
            payment_method: db.payment_method,
            reference: db.reference,
            failure_reason: db.failure_reason,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
