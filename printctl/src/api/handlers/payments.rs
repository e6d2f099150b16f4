//! HTTP handler for payment gateway notifications.

use crate::{AppState, api::models::payments::WebhookResponse, errors::Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::Json,
};

/// Payment gateway webhook. Not part of the student API docs.
///
/// Requires `Authorization: Apikey <secret>`. Redelivering a notification never credits twice.
/// Bad credentials are 401, an unparseable body 400 and an unavailable ledger 500; everything
/// else is acknowledged with 200 so the gateway stops retrying.
#[tracing::instrument(skip_all)]
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookResponse>> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let outcome = state.reconciler.reconcile_webhook(authorization, &body).await?;
    Ok(Json(WebhookResponse { success: true, outcome }))
}
