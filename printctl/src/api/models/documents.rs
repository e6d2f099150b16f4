//! API request/response models for registering stored uploads.

use crate::db::models::documents::DocumentDBResponse;
use crate::documents::DocumentFormat;
use crate::types::{DocumentId, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sent by the upload receiver once the file is on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRegister {
    pub owner_id: StudentId,
    /// Absolute path of the stored file, readable by this service
    pub stored_path: String,
    /// Extension (`docx`) or MIME type
    pub file_type: String,
    #[serde(default)]
    pub original_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: DocumentId,
    pub owner_id: StudentId,
    pub file_type: DocumentFormat,
    pub original_name: Option<String>,
    pub page_count: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentDBResponse> for DocumentResponse {
    fn from(db: DocumentDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            file_type: db.file_type,
            original_name: db.original_name,
            page_count: db.page_count,
            created_at: db.created_at,
        }
    }
}
