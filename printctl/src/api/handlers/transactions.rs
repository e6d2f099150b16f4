//! HTTP handlers for wallet top-ups.

use crate::{
    AppState,
    api::models::{
        pagination::{PageOf, Pagination},
        transactions::{TopUpCreate, TransactionResponse},
    },
    auth::CurrentStudent,
    errors::Result,
    payments::open_top_up,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};

/// Open a top-up
#[utoipa::path(
    post,
    path = "/top-ups",
    tag = "wallet",
    summary = "Open a wallet top-up",
    description = "Creates a PENDING transaction. Transfer `amount` with `reference` in the description; the balance is credited when the payment gateway confirms the transfer.",
    request_body = TopUpCreate,
    responses(
        (status = 201, description = "Top-up opened", body = TransactionResponse),
        (status = 400, description = "Pages must be positive"),
        (status = 401, description = "Missing or invalid student header"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn create_top_up(
    State(state): State<AppState>,
    student: CurrentStudent,
    Json(data): Json<TopUpCreate>,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    let transaction = open_top_up(state.storage.as_ref(), &state.config.payment, student.id, data.pages).await?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// List the caller's top-ups
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "wallet",
    summary = "List transactions",
    description = "The caller's top-up transactions, newest first.",
    params(Pagination),
    responses(
        (status = 200, description = "Transactions", body = PageOf<TransactionResponse>),
        (status = 401, description = "Missing or invalid student header"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn list_transactions(
    State(state): State<AppState>,
    student: CurrentStudent,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PageOf<TransactionResponse>>> {
    let (skip, limit) = pagination.params();
    let transactions = state.storage.list_transactions(student.id, skip, limit).await?;
    Ok(Json(PageOf::new(transactions.into_iter().map(Into::into).collect(), skip, limit)))
}

#[cfg(test)]
mod tests {
    use crate::api::models::transactions::TransactionResponse;
    use crate::db::models::transactions::TransactionStatus;
    use crate::test_utils::{STUDENT_HEADER, create_test_app, create_test_config};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use uuid::Uuid;

    #[test_log::test(tokio::test)]
    async fn test_open_and_list_top_ups() {
        let mut config = create_test_config();
        config.payment.price_per_page = Decimal::new(250, 0);
        let (server, _storage) = create_test_app(config).await;
        let student = Uuid::new_v4();

        let response = server
            .post("/api/v1/top-ups")
            .add_header(STUDENT_HEADER, student.to_string())
            .json(&json!({ "pages": 20 }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let opened: TransactionResponse = response.json();
        assert_eq!(opened.status, TransactionStatus::Pending);
        assert_eq!(opened.amount, Decimal::new(5000, 0));
        assert!(opened.reference.starts_with("PRN"));

        let listed: Value = server
            .get("/api/v1/transactions")
            .add_header(STUDENT_HEADER, student.to_string())
            .await
            .json();
        assert_eq!(listed["data"][0]["reference"], opened.reference.as_str());

        // Other students do not see it
        let listed: Value = server
            .get("/api/v1/transactions")
            .add_header(STUDENT_HEADER, Uuid::new_v4().to_string())
            .await
            .json();
        assert!(listed["data"].as_array().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_non_positive_pages_is_400() {
        let (server, _storage) = create_test_app(create_test_config()).await;

        server
            .post("/api/v1/top-ups")
            .add_header(STUDENT_HEADER, Uuid::new_v4().to_string())
            .json(&json!({ "pages": 0 }))
            .await
            .assert_status_bad_request();
    }
}
