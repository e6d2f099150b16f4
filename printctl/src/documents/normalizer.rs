//! Conversion of uploaded documents into a canonical PDF.
//!
//! The [`Normalizer`] holds an ordered list of [`ConversionStrategy`] implementations and tries
//! them one after another until one produces a PDF. Each attempt gets its own freshly created
//! temporary directory; a failed attempt's directory is removed as soon as the attempt ends, a
//! successful one lives as long as the returned [`NormalizedPdf`].
//!
//! Strategy failures are never surfaced individually. They are logged and collected, and only if
//! every strategy fails does the caller see [`ConversionError::Exhausted`].

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::DocumentFormat;
use crate::metrics::LedgerMetrics;

/// Magic bytes every PDF starts with.
const PDF_MAGIC: &[u8] = b"%PDF";

/// Why a single strategy did not produce a PDF.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed conversion result: {0}")]
    Descriptor(String),

    #[error("engine could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("engine timed out after {0:?}")]
    TimedOut(Duration),

    #[error("no output produced ({0})")]
    NoOutput(String),

    #[error("output is not a PDF")]
    NotPdf,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One failed attempt, kept for the terminal error message.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub strategy: &'static str,
    pub reason: String,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("source document {} is not readable: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create a conversion working directory: {0}")]
    Workdir(#[source] std::io::Error),

    #[error("{}", describe_exhausted(attempts))]
    Exhausted { attempts: Vec<FailedAttempt> },
}

fn describe_exhausted(attempts: &[FailedAttempt]) -> String {
    if attempts.is_empty() {
        return "document conversion failed: no conversion strategy is configured".to_string();
    }
    let tried = attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
    format!("document conversion failed after trying {tried}")
}

/// A way of turning a non-PDF document into a PDF.
#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    /// Short name used in logs and in the terminal error.
    fn name(&self) -> &'static str;

    /// Convert `source` and write the result somewhere inside `output_dir`.
    ///
    /// Returns the path of the produced file. The normalizer double-checks that the file
    /// exists and is a PDF before accepting it.
    async fn convert(&self, source: &Path, format: DocumentFormat, output_dir: &Path) -> Result<PathBuf, StrategyError>;
}

/// A normalized document ready for page counting.
#[derive(Debug)]
pub enum NormalizedPdf {
    /// The upload already was a PDF.
    Original(PathBuf),
    /// Produced by a strategy. The working directory is removed when this value is dropped.
    Converted {
        path: PathBuf,
        strategy: &'static str,
        _workdir: TempDir,
    },
}

impl NormalizedPdf {
    pub fn path(&self) -> &Path {
        match self {
            NormalizedPdf::Original(path) => path,
            NormalizedPdf::Converted { path, .. } => path,
        }
    }

    /// Name of the strategy that produced the PDF, `None` for pass-through.
    pub fn strategy(&self) -> Option<&'static str> {
        match self {
            NormalizedPdf::Original(_) => None,
            NormalizedPdf::Converted { strategy, .. } => Some(strategy),
        }
    }
}

/// Ordered fallback chain of conversion strategies.
#[derive(Clone)]
pub struct Normalizer {
    strategies: Vec<Arc<dyn ConversionStrategy>>,
    temp_root: Option<PathBuf>,
    metrics: Option<LedgerMetrics>,
}

impl Normalizer {
    pub fn new(strategies: Vec<Arc<dyn ConversionStrategy>>) -> Self {
        Self {
            strategies,
            temp_root: None,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LedgerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create working directories under `root` instead of the system temp directory.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Normalize `source` (declared as `format`) into a PDF.
    #[instrument(skip(self), fields(source = %source.display()), err)]
    pub async fn normalize(&self, source: &Path, format: DocumentFormat) -> Result<NormalizedPdf, ConversionError> {
        tokio::fs::metadata(source)
            .await
            .map_err(|e| ConversionError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })?;

        if format.is_pdf() {
            debug!("Document is already a PDF, passing through");
            return Ok(NormalizedPdf::Original(source.to_path_buf()));
        }

        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let workdir = self.create_workdir()?;
            let started = Instant::now();

            let outcome = match strategy.convert(source, format, workdir.path()).await {
                Ok(path) => verify_pdf(&path).await.map(|()| path),
                Err(e) => Err(e),
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_conversion(strategy.name(), outcome.is_ok(), started.elapsed().as_secs_f64());
            }

            match outcome {
                Ok(path) => {
                    info!(
                        strategy = strategy.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Converted {} document to PDF",
                        format
                    );
                    return Ok(NormalizedPdf::Converted {
                        path,
                        strategy: strategy.name(),
                        _workdir: workdir,
                    });
                }
                Err(e) => {
                    warn!(
                        strategy = strategy.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Conversion strategy failed, trying next: {}",
                        e
                    );
                    attempts.push(FailedAttempt {
                        strategy: strategy.name(),
                        reason: e.to_string(),
                    });
                    // workdir dropped here, removing whatever the attempt left behind
                }
            }
        }

        Err(ConversionError::Exhausted { attempts })
    }

    fn create_workdir(&self) -> Result<TempDir, ConversionError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("printctl-convert-");
            b
        };
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(ConversionError::Workdir)
    }
}

/// Success is judged by the file itself: it must exist and carry the PDF magic bytes.
async fn verify_pdf(path: &Path) -> Result<(), StrategyError> {
    use tokio::io::AsyncReadExt;

    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StrategyError::NoOutput(format!("{} does not exist", path.display())));
        }
        Err(e) => return Err(StrategyError::Io(e)),
    };

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) if magic == PDF_MAGIC => Ok(()),
        Ok(_) => Err(StrategyError::NotPdf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(StrategyError::NotPdf),
        Err(e) => Err(StrategyError::Io(e)),
    }
}
