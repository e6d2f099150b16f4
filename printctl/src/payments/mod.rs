//! Wallet top-ups and payment gateway reconciliation.
//!
//! A top-up starts as a PENDING transaction carrying a payment code ([`top_up::open_top_up`]).
//! The student includes that code in their bank transfer, and the gateway later notifies us
//! through a webhook. [`reconciler::Reconciler`] matches the notification to the transaction and
//! credits the ledger exactly once, however often the gateway delivers it.

pub mod reconciler;
pub mod top_up;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::storage::StorageError;

pub use reconciler::Reconciler;
pub use top_up::open_top_up;

/// Gateway-side identifier of a transfer. Sent as a number by some gateways and a string by
/// others.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum GatewayTransferId {
    Number(i64),
    Text(String),
}

impl fmt::Display for GatewayTransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayTransferId::Number(n) => write!(f, "{n}"),
            GatewayTransferId::Text(s) => f.write_str(s),
        }
    }
}

/// Body of a transfer notification. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotification {
    pub id: GatewayTransferId,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    /// Payment code the gateway itself recognised in the transfer, if any
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// `in` for money received, `out` for money sent
    pub transfer_type: String,
    pub transfer_amount: Decimal,
    #[serde(default)]
    pub reference_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl GatewayNotification {
    pub fn is_incoming(&self) -> bool {
        self.transfer_type.eq_ignore_ascii_case("in")
    }
}

/// What happened to a notification. Every variant is acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Matched a transaction. `applied` is false when it had already been credited.
    Acknowledged { reference: String, applied: bool },
    /// Nothing to do for this notification
    Ignored { reason: String },
    /// Matched a transaction but the amount differs; the transaction was failed
    Mismatched {
        reference: String,
        expected: Decimal,
        received: Decimal,
    },
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Acknowledged { applied: true, .. } => "credited",
            ReconcileOutcome::Acknowledged { applied: false, .. } => "duplicate",
            ReconcileOutcome::Ignored { .. } => "ignored",
            ReconcileOutcome::Mismatched { .. } => "mismatched",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook authentication failed")]
    Unauthorized,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("a top-up must add at least one page, got {0}")]
    InvalidPages(i64),

    #[error("amount for {0} pages overflows")]
    AmountOverflow(i64),

    #[error("could not allocate a unique payment reference")]
    ReferenceExhausted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_gateway_payload() {
        let payload = r#"{
            "id": 92704,
            "gateway": "Vietcombank",
            "transactionDate": "2026-10-19 14:02:37",
            "accountNumber": "0123499999",
            "code": null,
            "content": "PRNAB12CD34 topup",
            "transferType": "in",
            "transferAmount": 25000,
            "accumulated": 19077000,
            "subAccount": null,
            "referenceCode": "MBVCB.3278907687",
            "description": ""
        }"#;

        let notification: GatewayNotification = serde_json::from_str(payload).unwrap();

        assert_eq!(notification.id, GatewayTransferId::Number(92704));
        assert_eq!(notification.id.to_string(), "92704");
        assert!(notification.is_incoming());
        assert_eq!(notification.transfer_amount, Decimal::new(25000, 0));
        assert_eq!(notification.code, None);
        assert_eq!(notification.reference_code.as_deref(), Some("MBVCB.3278907687"));
    }

    #[test]
    fn test_string_ids_are_accepted() {
        let payload = r#"{"id": "tx-1", "transferType": "out", "transferAmount": "10.50"}"#;

        let notification: GatewayNotification = serde_json::from_str(payload).unwrap();

        assert_eq!(notification.id.to_string(), "tx-1");
        assert!(!notification.is_incoming());
        assert_eq!(notification.transfer_amount, Decimal::new(1050, 2));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ReconcileOutcome::Acknowledged {
            reference: "PRNAB12CD34".to_string(),
            applied: true,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"status": "acknowledged", "reference": "PRNAB12CD34", "applied": true})
        );
    }
}
