//! Database models for page balances.

use crate::pricing::PageUnits;
use crate::types::StudentId;
use chrono::{DateTime, Utc};

/// How a student without a balance row is provisioned on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancePolicy {
    pub default_allotment: PageUnits,
    pub semester: String,
}

/// Database response for a student's page balance
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PageBalanceDBResponse {
    pub student_id: StudentId,
    /// Never negative
    pub balance: PageUnits,
    pub default_allotment: PageUnits,
    pub semester: String,
    pub updated_at: DateTime<Utc>,
}
