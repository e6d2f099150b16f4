//! API response model for the payment webhook.

use crate::payments::ReconcileOutcome;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    /// Always true; the delivery was accepted and needs no retry
    pub success: bool,
    pub outcome: ReconcileOutcome,
}
