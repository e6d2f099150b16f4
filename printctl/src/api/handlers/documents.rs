//! HTTP handler for the upload receiver.

use std::path::PathBuf;

use crate::{
    AppState,
    api::models::documents::{DocumentRegister, DocumentResponse},
    auth::api_key,
    db::models::documents::DocumentCreateDBRequest,
    documents::{DocumentFormat, UnsupportedFormat},
    errors::{Error, Result},
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::Json,
};
use tracing::{info, warn};

/// Register a file the upload receiver has stored. Not part of the student API docs.
///
/// Requires `Authorization: Apikey <uploads.ingest_api_key>`. The file must exist and, when
/// `uploads.root` is set, lie under it. Parsing and validating the upload itself happens before
/// this call.
#[tracing::instrument(skip_all)]
pub async fn register_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DocumentRegister>,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let authorized = match state.config.uploads.ingest_api_key.as_deref() {
        Some(secret) => api_key::matches(secret, authorization),
        None => {
            warn!("Document registration called but no ingest API key is configured");
            false
        }
    };
    if !authorized {
        return Err(Error::Unauthenticated {
            message: Some("Invalid ingest credentials".to_string()),
        });
    }

    let file_type: DocumentFormat = body
        .file_type
        .parse()
        .map_err(|e: UnsupportedFormat| Error::BadRequest { message: e.to_string() })?;

    let stored_path = tokio::fs::canonicalize(&body.stored_path).await.map_err(|_| Error::BadRequest {
        message: "stored_path does not refer to a readable file".to_string(),
    })?;
    if let Some(root) = &state.config.uploads.root {
        let root: PathBuf = tokio::fs::canonicalize(root).await.map_err(|e| Error::Internal {
            operation: format!("resolve uploads.root {}: {e}", root.display()),
        })?;
        if !stored_path.starts_with(&root) {
            return Err(Error::BadRequest {
                message: "stored_path is outside the uploads directory".to_string(),
            });
        }
    }

    let document = state
        .storage
        .register_document(DocumentCreateDBRequest {
            owner_id: body.owner_id,
            stored_path: stored_path.to_string_lossy().into_owned(),
            file_type,
            original_name: body.original_name,
        })
        .await?;

    info!(document = %document.id, %file_type, "Registered document");
    Ok((StatusCode::CREATED, Json(document.into())))
}

#[cfg(test)]
mod tests {
    use crate::api::models::{documents::DocumentResponse, print_jobs::PrintJobResponse};
    use crate::test_utils::{INGEST_API_KEY, STUDENT_HEADER, create_test_app, create_test_config, sample_pdf};
    use axum::http::StatusCode;
    use serde_json::json;
    use uuid::Uuid;

    fn auth() -> String {
        format!("Apikey {INGEST_API_KEY}")
    }

    #[test_log::test(tokio::test)]
    async fn test_registered_upload_can_be_printed() {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.uploads.root = Some(uploads.path().to_path_buf());
        let (server, _storage) = create_test_app(config).await;
        let student = Uuid::new_v4();
        let path = uploads.path().join("handout.pdf");
        std::fs::write(&path, sample_pdf(3)).unwrap();

        let response = server
            .post("/internal/documents")
            .add_header("authorization", auth())
            .json(&json!({
                "owner_id": student,
                "stored_path": path,
                "file_type": "application/pdf",
                "original_name": "handout.pdf"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let document: DocumentResponse = response.json();
        assert_eq!(document.owner_id, student);
        assert_eq!(document.page_count, None);

        let job: PrintJobResponse = server
            .post("/api/v1/print-jobs")
            .add_header(STUDENT_HEADER, student.to_string())
            .json(&json!({ "printer_id": Uuid::new_v4(), "document_id": document.id }))
            .await
            .json();
        assert_eq!(job.cost, 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_requires_ingest_key() {
        let uploads = tempfile::tempdir().unwrap();
        let path = uploads.path().join("a.pdf");
        std::fs::write(&path, sample_pdf(1)).unwrap();
        let body = json!({ "owner_id": Uuid::new_v4(), "stored_path": path, "file_type": "pdf" });

        let (server, _storage) = create_test_app(create_test_config()).await;
        server.post("/internal/documents").json(&body).await.assert_status_unauthorized();
        server
            .post("/internal/documents")
            .add_header("authorization", "Apikey wrong")
            .json(&body)
            .await
            .assert_status_unauthorized();

        let mut config = create_test_config();
        config.uploads.ingest_api_key = None;
        let (server, _storage) = create_test_app(config).await;
        server
            .post("/internal/documents")
            .add_header("authorization", auth())
            .json(&body)
            .await
            .assert_status_unauthorized();
    }

    #[test_log::test(tokio::test)]
    async fn test_rejects_bad_registrations() {
        let uploads = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.uploads.root = Some(uploads.path().to_path_buf());
        let (server, _storage) = create_test_app(config).await;

        let inside = uploads.path().join("notes.odt");
        std::fs::write(&inside, b"odt").unwrap();
        let outside = elsewhere.path().join("passwd.pdf");
        std::fs::write(&outside, sample_pdf(1)).unwrap();

        let cases = [
            json!({ "owner_id": Uuid::new_v4(), "stored_path": inside, "file_type": "odt" }),
            json!({ "owner_id": Uuid::new_v4(), "stored_path": uploads.path().join("missing.pdf"), "file_type": "pdf" }),
            json!({ "owner_id": Uuid::new_v4(), "stored_path": outside, "file_type": "pdf" }),
            json!({ "owner_id": Uuid::new_v4(), "stored_path": uploads.path().join("..").join(elsewhere.path().file_name().unwrap()).join("passwd.pdf"), "file_type": "pdf" }),
        ];
        for body in cases {
            server
                .post("/internal/documents")
                .add_header("authorization", auth())
                .json(&body)
                .await
                .assert_status_bad_request();
        }
    }
}
