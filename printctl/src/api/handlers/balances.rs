//! HTTP handler for the caller's page balance.

use crate::{AppState, api::models::balances::BalanceResponse, auth::CurrentStudent, errors::Result};
use axum::{extract::State, response::Json};

/// Get the caller's page balance
#[utoipa::path(
    get,
    path = "/balance",
    tag = "wallet",
    summary = "Get page balance",
    description = "Students seen for the first time are provisioned with the semester's default allotment.",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Missing or invalid student header"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn get_balance(State(state): State<AppState>, student: CurrentStudent) -> Result<Json<BalanceResponse>> {
    let balance = state.storage.balance(student.id).await?;
    Ok(Json(balance.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::balances::BalanceResponse;
    use crate::test_utils::{STUDENT_HEADER, create_test_app, create_test_config};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_new_student_gets_default_allotment() {
        let mut config = create_test_config();
        config.balances.default_allotment = 250;
        config.balances.semester = "2026-FALL".to_string();
        let (server, _storage) = create_test_app(config).await;
        let student = Uuid::new_v4();

        let balance: BalanceResponse = server
            .get("/api/v1/balance")
            .add_header(STUDENT_HEADER, student.to_string())
            .await
            .json();

        assert_eq!(balance.student_id, student);
        assert_eq!(balance.balance, 250);
        assert_eq!(balance.semester, "2026-FALL");
    }
}
