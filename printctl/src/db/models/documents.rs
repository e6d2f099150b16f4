//! Database models for uploaded documents.

use crate::documents::DocumentFormat;
use crate::types::{DocumentId, StudentId};
use chrono::{DateTime, Utc};

/// Database request for registering an uploaded document
#[derive(Debug, Clone)]
pub struct DocumentCreateDBRequest {
    pub owner_id: StudentId,
    /// Where the upload receiver stored the file
    pub stored_path: String,
    pub file_type: DocumentFormat,
    pub original_name: Option<String>,
}

/// Database response for a document
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DocumentDBResponse {
    pub id: DocumentId,
    pub owner_id: StudentId,
    pub stored_path: String,
    pub file_type: DocumentFormat,
    pub original_name: Option<String>,
    /// Set exactly once, together with `normalized_path`
    pub page_count: Option<i32>,
    pub normalized_path: Option<String>,
    pub created_at: DateTime<Utc>,
}
