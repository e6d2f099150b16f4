//! API request/response models for print jobs.

use crate::db::models::print_jobs::{PrintJobDBResponse, PrintJobStatus};
use crate::pricing::{PageUnits, PaperSize};
use crate::settlement::PrintJobRequest;
use crate::types::{DocumentId, PrintJobId, PrinterId, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrintJobCreate {
    #[schema(value_type = String, format = "uuid")]
    pub printer_id: PrinterId,
    /// A document previously uploaded by the same student
    #[schema(value_type = String, format = "uuid")]
    pub document_id: DocumentId,
    /// Number of copies, at least 1 (default: 1)
    #[serde(default = "one")]
    pub copies: i32,
    #[serde(default)]
    pub paper_size: PaperSize,
    /// Printing on both sides does not change the cost
    #[serde(default)]
    pub duplex: bool,
    /// Pages to print, e.g. `1-3,7`. Omitted or `all` prints every page.
    #[serde(default)]
    pub page_range: Option<String>,
}

impl PrintJobCreate {
    pub fn into_request(self, student_id: StudentId) -> PrintJobRequest {
        PrintJobRequest {
            student_id,
            printer_id: self.printer_id,
            document_id: self.document_id,
            copies: self.copies,
            paper_size: self.paper_size,
            duplex: self.duplex,
            page_range: self.page_range,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrintJobResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PrintJobId,
    #[schema(value_type = String, format = "uuid")]
    pub student_id: StudentId,
    #[schema(value_type = String, format = "uuid")]
    pub printer_id: PrinterId,
    #[schema(value_type = String, format = "uuid")]
    pub document_id: DocumentId,
    pub copies: i32,
    pub paper_size: PaperSize,
    pub duplex: bool,
    pub page_range: String,
    /// Pages printed per copy
    pub resolved_pages: i32,
    /// Page units debited for this job
    pub cost: PageUnits,
    pub status: PrintJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PrintJobDBResponse> for PrintJobResponse {
    fn from(db: PrintJobDBResponse) -> Self {
        Self {
            id: db.id,
            student_id: db.student_id,
            printer_id: db.printer_id,
            document_id: db.document_id,
            copies: db.copies,
            paper_size: db.paper_size,
            duplex: db.duplex,
            page_range: db.page_range,
            resolved_pages: db.resolved_pages,
            cost: db.cost,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
