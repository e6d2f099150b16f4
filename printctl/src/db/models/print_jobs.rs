//! Database models for print jobs.

use crate::pricing::{PageUnits, PaperSize};
use crate::types::{DocumentId, PrintJobId, PrinterId, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Print job lifecycle status stored as TEXT in database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PrintJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for PrintJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrintJobStatus::Pending => "PENDING",
            PrintJobStatus::Processing => "PROCESSING",
            PrintJobStatus::Completed => "COMPLETED",
            PrintJobStatus::Failed => "FAILED",
            PrintJobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Database request for creating a print job together with its debit
#[derive(Debug, Clone)]
pub struct PrintJobCreateDBRequest {
    pub student_id: StudentId,
    pub printer_id: PrinterId,
    pub document_id: DocumentId,
    pub copies: i32,
    pub paper_size: PaperSize,
    pub duplex: bool,
    pub page_range: String,
    /// Pages actually printed per copy
    pub resolved_pages: i32,
    /// Total page units to debit
    pub cost: PageUnits,
}

/// Database response for a print job
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PrintJobDBResponse {
    pub id: PrintJobId,
    pub student_id: StudentId,
    pub printer_id: PrinterId,
    pub document_id: DocumentId,
    pub copies: i32,
    pub paper_size: PaperSize,
    pub duplex: bool,
    pub page_range: String,
    pub resolved_pages: i32,
    pub cost: PageUnits,
    pub status: PrintJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
