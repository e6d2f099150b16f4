//! Authoritative page counts from normalized PDFs.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PageCountError {
    #[error("failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF could not be parsed: {0}")]
    Corrupt(String),

    #[error("PDF has no pages")]
    Empty,
}

/// Count the pages of the PDF at `path`.
///
/// Parsing walks the document's page tree, so identical bytes always give the same count.
/// Zero pages is reported as [`PageCountError::Empty`], never as a valid result.
pub async fn count_pages(path: &Path) -> Result<u32, PageCountError> {
    let bytes = tokio::fs::read(path).await?;
    let pages = tokio::task::spawn_blocking(move || count_pages_in(&bytes))
        .await
        .map_err(|e| PageCountError::Corrupt(format!("page counter task failed: {e}")))??;

    debug!("Counted {} pages in {}", pages, path.display());
    Ok(pages)
}

/// Count the pages of an in-memory PDF.
pub fn count_pages_in(bytes: &[u8]) -> Result<u32, PageCountError> {
    let document = lopdf::Document::load_mem(bytes).map_err(|e| PageCountError::Corrupt(e.to_string()))?;

    match document.get_pages().len() {
        0 => Err(PageCountError::Empty),
        n => u32::try_from(n).map_err(|_| PageCountError::Corrupt(format!("implausible page count {n}"))),
    }
}
