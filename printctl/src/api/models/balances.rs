//! API response model for page balances.

use crate::db::models::balances::PageBalanceDBResponse;
use crate::pricing::PageUnits;
use crate::types::StudentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub student_id: StudentId,
    /// Page units available for printing
    pub balance: PageUnits,
    pub default_allotment: PageUnits,
    pub semester: String,
    pub updated_at: DateTime<Utc>,
}

impl From<PageBalanceDBResponse> for BalanceResponse {
    fn from(db: PageBalanceDBResponse) -> Self {
        Self {
            student_id: db.student_id,
            balance: db.balance,
            default_allotment: db.default_allotment,
            semester: db.semester,
            updated_at: db.updated_at,
        }
    }
}
