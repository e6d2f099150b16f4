//! OpenAPI documentation for the student API at `/api/v1/*`.
//!
//! The payment webhook is called by the gateway, not by clients, and is left out.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::config::ProxyHeaderAuthConfig;

/// Documents the trusted proxy header that identifies the student.
struct StudentHeaderAddon;

impl Modify for StudentHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let header = ProxyHeaderAuthConfig::default().header_name;
            components.security_schemes.insert(
                "StudentHeader".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    header,
                    "Student UUID, set by the authenticating gateway in front of this service".to_string(),
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Student API")
    ),
    modifiers(&StudentHeaderAddon),
    security(("StudentHeader" = [])),
    paths(
        api::handlers::print_jobs::create_print_job,
        api::handlers::print_jobs::list_print_jobs,
        api::handlers::print_jobs::get_print_job,
        api::handlers::print_jobs::cancel_print_job,
        api::handlers::balances::get_balance,
        api::handlers::transactions::create_top_up,
        api::handlers::transactions::list_transactions,
    ),
    components(
        schemas(
            api::models::print_jobs::PrintJobCreate,
            api::models::print_jobs::PrintJobResponse,
            api::models::balances::BalanceResponse,
            api::models::transactions::TopUpCreate,
            api::models::transactions::TransactionResponse,
            crate::pricing::PaperSize,
            crate::db::models::print_jobs::PrintJobStatus,
            crate::db::models::transactions::TransactionStatus,
        )
    ),
    tags(
        (name = "print_jobs", description = "Submitting and managing print jobs"),
        (name = "wallet", description = "Page balance and top-ups"),
    )
)]
pub struct ApiDoc;
