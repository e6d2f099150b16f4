//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Print jobs** (`/api/v1/print-jobs/*`): settlement, listing and cancellation
//! - **Wallet** (`/api/v1/balance`, `/api/v1/top-ups`, `/api/v1/transactions`): balance and top-ups
//! - **Webhooks** (`/webhooks/payments`): payment gateway notifications
//! - **Ingress** (`/internal/documents`): the upload receiver registers stored files
//!
//! Student-facing endpoints identify the caller through the trusted proxy header read by
//! [`crate::auth::CurrentStudent`]. OpenAPI documentation is served at `/api/docs`.

pub mod handlers;
pub mod models;
