//! Helpers shared by the unit tests.

use crate::config::{Config, DatabaseConfig};
use crate::db::models::documents::{DocumentCreateDBRequest, DocumentDBResponse};
use crate::documents::DocumentFormat;
use crate::storage::Storage;
use crate::storage::in_memory::InMemoryStorage;
use crate::types::StudentId;
use axum_test::TestServer;
use lopdf::{Document, Object, dictionary};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Header the test config reads the student from.
pub const STUDENT_HEADER: &str = "x-printctl-student";

/// Secret the test config expects from the payment gateway.
pub const WEBHOOK_API_KEY: &str = "test-webhook-key";

/// Secret the test config expects from the upload receiver.
pub const INGEST_API_KEY: &str = "test-ingest-key";

/// A minimal, well-formed PDF with `pages` blank A4 pages.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize sample PDF");
    bytes
}

/// reqwest is built without a default crypto provider; tests building a client need one.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Write an executable shell script standing in for the office engine.
///
/// The script receives the engine's real arguments. Before `body` runs, `$outdir` holds the
/// `--outdir` value and `$stem` the input file name without its extension.
#[cfg(unix)]
pub fn fake_engine(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
outdir=""
source=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) source="$1"; shift ;;
  esac
done
name=$(basename "$source")
stem="${{name%.*}}"
{body}
"#
    );

    let path = dir.join("fake-soffice");
    std::fs::write(&path, script).expect("Failed to write fake engine");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("Failed to mark fake engine executable");
    path
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        database: DatabaseConfig::InMemory,
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.conversion.local.enabled = false;
    config.payment.webhook_api_key = Some(WEBHOOK_API_KEY.to_string());
    config.uploads.ingest_api_key = Some(INGEST_API_KEY.to_string());
    config.auth.proxy_header.header_name = STUDENT_HEADER.to_string();
    config
}

/// Application state over a fresh in-memory ledger.
pub fn create_test_state() -> crate::AppState {
    let config = create_test_config();
    let storage = Arc::new(InMemoryStorage::new(config.balances.policy()));
    crate::build_state(config, storage).expect("Failed to build application state")
}

/// Build the full router on top of an in-memory ledger.
pub async fn create_test_app(config: Config) -> (TestServer, Arc<dyn Storage>) {
    let app = crate::Application::new(config).await.expect("Failed to create application");
    let storage = app.storage();
    (app.into_test_server(), storage)
}

/// Store `pages` blank pages as a PDF upload in `dir` and register it for `owner`.
pub async fn seed_pdf_document(storage: &dyn Storage, owner: StudentId, dir: &Path, pages: usize) -> DocumentDBResponse {
    let path = dir.join(format!("{}.pdf", uuid::Uuid::new_v4()));
    std::fs::write(&path, sample_pdf(pages)).expect("Failed to write upload");

    storage
        .register_document(DocumentCreateDBRequest {
            owner_id: owner,
            stored_path: path.to_string_lossy().into_owned(),
            file_type: DocumentFormat::Pdf,
            original_name: Some("upload.pdf".to_string()),
        })
        .await
        .expect("Failed to register document")
}
