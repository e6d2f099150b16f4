//! Print-job settlement.
//!
//! [`Settlement::settle_print_job`] turns a print request into a persisted, PENDING print job:
//!
//! 1. validate the request
//! 2. load the document (it must belong to the requester)
//! 3. obtain the page count, normalizing and counting the document on first use
//! 4. resolve the page range
//! 5. price the job
//! 6. debit the balance and create the job in one unit of work
//!
//! Every failure before step 6 leaves the ledger untouched. Step 6 is the only mutation of the
//! balance, and the store makes it atomic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::errors::DbError;
use crate::db::models::documents::DocumentDBResponse;
use crate::db::models::print_jobs::{PrintJobCreateDBRequest, PrintJobDBResponse};
use crate::documents::{ConversionError, NormalizedPdf, Normalizer, PageCountError, count_pages};
use crate::metrics::LedgerMetrics;
use crate::pricing::{CostInput, PageUnits, PaperSize, calculate_cost, select_pages};
use crate::storage::{Storage, StorageError};
use crate::types::{DocumentId, PrinterId, StudentId, abbrev_uuid};

/// A print request as submitted by a student. Not persisted.
#[derive(Debug, Clone)]
pub struct PrintJobRequest {
    pub student_id: StudentId,
    pub printer_id: PrinterId,
    pub document_id: DocumentId,
    pub copies: i32,
    pub paper_size: PaperSize,
    pub duplex: bool,
    /// Range expression such as `1-3,7`; `None`, blank or `all` selects every page
    pub page_range: Option<String>,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid print request: {0}")]
    InvalidRequest(String),

    #[error("page range {expression:?} selects no pages of a {total_pages}-page document")]
    InvalidRange { expression: String, total_pages: u32 },

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error(transparent)]
    ConversionFailed(#[from] ConversionError),

    #[error("page count unavailable: {0}")]
    PageCountUnavailable(#[from] PageCountError),

    #[error("insufficient balance: {required} page units required, {available} available")]
    InsufficientBalance { required: PageUnits, available: PageUnits },

    #[error("failed to persist normalized document: {0}")]
    Persist(#[source] std::io::Error),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for SettlementError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InsufficientBalance { required, available } => SettlementError::InsufficientBalance { required, available },
            other => SettlementError::Storage(other),
        }
    }
}

impl SettlementError {
    /// Short label for the settlement counter.
    fn outcome(&self) -> &'static str {
        match self {
            SettlementError::InvalidRequest(_) => "invalid_request",
            SettlementError::InvalidRange { .. } => "invalid_range",
            SettlementError::DocumentNotFound(_) => "document_not_found",
            SettlementError::ConversionFailed(_) => "conversion_failed",
            SettlementError::PageCountUnavailable(_) => "page_count_unavailable",
            SettlementError::InsufficientBalance { .. } => "insufficient_balance",
            SettlementError::Persist(_) | SettlementError::Storage(_) => "error",
        }
    }
}

/// Composes normalization, pricing and the ledger into one settlement operation.
#[derive(Clone)]
pub struct Settlement {
    storage: Arc<dyn Storage>,
    normalizer: Normalizer,
    a3_multiplier: f64,
    metrics: Option<LedgerMetrics>,
    normalizing: NormalizationLocks,
}

impl Settlement {
    pub fn new(storage: Arc<dyn Storage>, normalizer: Normalizer, a3_multiplier: f64) -> Self {
        Self {
            storage,
            normalizer,
            a3_multiplier,
            metrics: None,
            normalizing: NormalizationLocks::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: LedgerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Settle a print request into a PENDING print job, debiting its cost.
    #[instrument(skip_all, fields(student = %abbrev_uuid(&request.student_id), document = %abbrev_uuid(&request.document_id)), err)]
    pub async fn settle_print_job(&self, request: PrintJobRequest) -> Result<PrintJobDBResponse, SettlementError> {
        let result = self.settle(request).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(job) => {
                    metrics.record_settlement("settled");
                    metrics.record_page_units("debit", job.cost);
                }
                Err(e) => metrics.record_settlement(e.outcome()),
            }
        }
        result
    }

    async fn settle(&self, request: PrintJobRequest) -> Result<PrintJobDBResponse, SettlementError> {
        let copies = u32::try_from(request.copies)
            .ok()
            .filter(|&c| c >= 1)
            .ok_or_else(|| SettlementError::InvalidRequest(format!("copies must be at least 1, got {}", request.copies)))?;

        let document = match self.storage.get_document(request.document_id).await? {
            Some(document) if document.owner_id == request.student_id => document,
            Some(_) => {
                debug!("Document belongs to another student");
                return Err(SettlementError::DocumentNotFound(request.document_id));
            }
            None => return Err(SettlementError::DocumentNotFound(request.document_id)),
        };

        let total_pages = self.page_count(&document).await?;

        let selection = select_pages(request.page_range.as_deref(), total_pages);
        if selection.is_empty() {
            return Err(SettlementError::InvalidRange {
                expression: request.page_range.unwrap_or_default(),
                total_pages,
            });
        }
        let effective_pages = selection.effective_page_count(total_pages);

        let cost = calculate_cost(&CostInput {
            effective_pages,
            copies,
            paper_size: request.paper_size,
            a3_multiplier: self.a3_multiplier,
            duplex: request.duplex,
        })
        .map_err(|e| SettlementError::InvalidRequest(e.to_string()))?;

        let resolved_pages =
            i32::try_from(effective_pages).map_err(|_| SettlementError::InvalidRequest(format!("{effective_pages} pages is too many")))?;

        let job = self
            .storage
            .debit(PrintJobCreateDBRequest {
                student_id: request.student_id,
                printer_id: request.printer_id,
                document_id: request.document_id,
                copies: request.copies,
                paper_size: request.paper_size,
                duplex: request.duplex,
                page_range: request.page_range.unwrap_or_else(|| "all".to_string()),
                resolved_pages,
                cost,
            })
            .await
            .map_err(|e| match e {
                // Document removed between lookup and debit
                StorageError::Database(DbError::ForeignKeyViolation { .. }) => SettlementError::DocumentNotFound(request.document_id),
                other => other.into(),
            })?;

        info!(
            print_job = %abbrev_uuid(&job.id),
            pages = effective_pages,
            copies,
            cost,
            "Settled print job"
        );
        Ok(job)
    }

    /// The recorded page count, or normalize, count and record it on first use.
    ///
    /// Concurrent first settlements of one document wait on a per-document lock, so the
    /// strategy chain runs once per process. Across processes the set-once guard in the store
    /// decides which normalized file is kept.
    async fn page_count(&self, document: &DocumentDBResponse) -> Result<u32, SettlementError> {
        if let Some(recorded) = recorded_page_count(document) {
            debug!(pages = recorded, "Using recorded page count");
            return Ok(recorded);
        }

        let _claim = self.normalizing.claim(document.id).await;
        self.normalize_and_record(document).await
    }

    async fn normalize_and_record(&self, document: &DocumentDBResponse) -> Result<u32, SettlementError> {
        // Whoever held the lock before us may have recorded it already
        let current = self
            .storage
            .get_document(document.id)
            .await?
            .ok_or(SettlementError::DocumentNotFound(document.id))?;
        if let Some(recorded) = recorded_page_count(&current) {
            debug!(pages = recorded, "Page count recorded by a concurrent settlement");
            return Ok(recorded);
        }

        let stored_path = Path::new(&document.stored_path);
        let normalized = self.normalizer.normalize(stored_path, document.file_type).await?;
        let pages = count_pages(normalized.path()).await?;
        let page_count = i32::try_from(pages).map_err(|_| PageCountError::Corrupt(format!("implausible page count {pages}")))?;

        let normalized_path = persist_normalized(&normalized, stored_path).await?;
        let normalized_path_str = normalized_path.to_string_lossy().into_owned();
        let recorded = match self
            .storage
            .record_page_count(document.id, page_count, &normalized_path_str)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                discard_normalized(&normalized, &normalized_path).await;
                return Err(e.into());
            }
        };

        if recorded.normalized_path.as_deref() == Some(normalized_path_str.as_str()) {
            return Ok(pages);
        }

        // Another process recorded first; its file and count are authoritative
        discard_normalized(&normalized, &normalized_path).await;
        let stored = recorded.page_count.unwrap_or(page_count);
        if stored != page_count {
            warn!(counted = page_count, stored, "Page count already recorded with a different value");
        }
        u32::try_from(stored).map_err(|_| PageCountError::Corrupt(format!("implausible page count {stored}")).into())
    }
}

fn recorded_page_count(document: &DocumentDBResponse) -> Option<u32> {
    document.page_count.and_then(|n| u32::try_from(n).ok()).filter(|&n| n > 0)
}

/// Per-document locks held while a document is being normalized.
#[derive(Clone, Default)]
struct NormalizationLocks {
    inner: Arc<parking_lot::Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl NormalizationLocks {
    async fn claim(&self, id: DocumentId) -> NormalizationClaim {
        let lock = self.inner.lock().entry(id).or_default().clone();
        NormalizationClaim {
            _held: lock.lock_owned().await,
            locks: self.clone(),
            id,
        }
    }
}

struct NormalizationClaim {
    _held: tokio::sync::OwnedMutexGuard<()>,
    locks: NormalizationLocks,
    id: DocumentId,
}

impl Drop for NormalizationClaim {
    fn drop(&mut self) {
        let mut locks = self.locks.inner.lock();
        // One reference in the map, one in `_held`; anything more is a waiter
        if locks.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            locks.remove(&self.id);
        }
    }
}

/// Keep a converted PDF next to the upload; a PDF upload is its own normalized form.
///
/// Each caller writes its own `<stem>.normalized-<uuid>.pdf`, so concurrent writers never share
/// a file.
async fn persist_normalized(normalized: &NormalizedPdf, stored_path: &Path) -> Result<PathBuf, SettlementError> {
    match normalized {
        NormalizedPdf::Original(path) => Ok(path.clone()),
        NormalizedPdf::Converted { path, .. } => {
            let stem = stored_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let target = stored_path.with_file_name(format!("{stem}.normalized-{}.pdf", Uuid::new_v4().simple()));
            tokio::fs::copy(path, &target).await.map_err(SettlementError::Persist)?;
            Ok(target)
        }
    }
}

async fn discard_normalized(normalized: &NormalizedPdf, persisted: &Path) {
    if let NormalizedPdf::Converted { .. } = normalized
        && let Err(e) = tokio::fs::remove_file(persisted).await
    {
        warn!("Failed to remove unused normalized document {}: {}", persisted.display(), e);
    }
}
