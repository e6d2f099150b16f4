//! Document normalization and page counting.
//!
//! Uploaded documents come in a handful of office formats. Before a print job can be priced,
//! the document is normalized into a PDF ([`normalizer`]) and its pages are counted
//! ([`page_count`]). Normalization walks an ordered list of strategies:
//!
//! 1. [`remote::RemoteConversion`] - an optional HTTP conversion service
//! 2. [`local::LocalEngine`] - a headless office suite started as a child process
//!
//! PDFs pass straight through without touching either strategy.

pub mod local;
pub mod normalizer;
pub mod page_count;
pub mod remote;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

pub use normalizer::{ConversionError, ConversionStrategy, NormalizedPdf, Normalizer, StrategyError};
pub use page_count::{PageCountError, count_pages};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported document type: {0}")]
pub struct UnsupportedFormat(pub String);

/// Declared type of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Doc,
    Docx,
    Ppt,
    Pptx,
    Pdf,
    Txt,
    Xls,
    Xlsx,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Doc => "doc",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Ppt => "ppt",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Doc => "application/msword",
            DocumentFormat::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            DocumentFormat::Ppt => "application/vnd.ms-powerpoint",
            DocumentFormat::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Txt => "text/plain",
            DocumentFormat::Xls => "application/vnd.ms-excel",
            DocumentFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentFormat::Pdf)
    }

    const ALL: [DocumentFormat; 8] = [
        DocumentFormat::Doc,
        DocumentFormat::Docx,
        DocumentFormat::Ppt,
        DocumentFormat::Pptx,
        DocumentFormat::Pdf,
        DocumentFormat::Txt,
        DocumentFormat::Xls,
        DocumentFormat::Xlsx,
    ];
}

/// Accepts either an extension (`docx`, `.docx`) or the matching MIME type.
impl FromStr for DocumentFormat {
    type Err = UnsupportedFormat;

    fn from_str(declared: &str) -> Result<Self, Self::Err> {
        let normalized = declared.trim().trim_start_matches('.').to_ascii_lowercase();
        // Drop MIME parameters such as "; charset=utf-8"
        let normalized = normalized.split(';').next().unwrap_or_default().trim();

        DocumentFormat::ALL
            .into_iter()
            .find(|format| format.extension() == normalized || format.mime_type() == normalized)
            .ok_or_else(|| UnsupportedFormat(declared.to_string()))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
