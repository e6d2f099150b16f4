//! Matching gateway notifications to pending top-ups.

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{GatewayNotification, ReconcileError, ReconcileOutcome};
use crate::auth::api_key;
use crate::config::PaymentConfig;
use crate::db::models::transactions::{CreditRequest, TransactionDBResponse, TransactionStatus};
use crate::metrics::LedgerMetrics;
use crate::storage::{Storage, StorageError};

/// Length of the random part of a payment code.
pub(crate) const CODE_LENGTH: usize = 8;

#[derive(Clone)]
pub struct Reconciler {
    storage: Arc<dyn Storage>,
    api_key: Option<String>,
    code_pattern: Regex,
    metrics: Option<LedgerMetrics>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn Storage>, config: &PaymentConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            storage,
            api_key: config.webhook_api_key.clone(),
            code_pattern: payment_code_pattern(&config.reference_prefix)?,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: LedgerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Authenticate, parse and apply one webhook delivery.
    ///
    /// Deliveries are idempotent: a notification for an already credited transaction is
    /// acknowledged without touching the balance. Only authentication failures, unparseable
    /// bodies and an unavailable store are errors; every other notification is acknowledged
    /// with an outcome describing what happened.
    #[instrument(skip_all, err)]
    pub async fn reconcile_webhook(&self, authorization: Option<&str>, body: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        self.authenticate(authorization)?;

        let notification: GatewayNotification = serde_json::from_slice(body)?;
        debug!(gateway_id = %notification.id, "Received transfer notification");

        let outcome = self.reconcile(&notification).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation(outcome.label());
        }
        Ok(outcome)
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<(), ReconcileError> {
        let Some(secret) = self.api_key.as_deref() else {
            warn!("Payment webhook called but no webhook API key is configured");
            return Err(ReconcileError::Unauthorized);
        };
        if api_key::matches(secret, authorization) {
            Ok(())
        } else {
            warn!("Payment webhook presented an invalid API key");
            Err(ReconcileError::Unauthorized)
        }
    }

    async fn reconcile(&self, notification: &GatewayNotification) -> Result<ReconcileOutcome, ReconcileError> {
        if !notification.is_incoming() {
            debug!(transfer_type = %notification.transfer_type, "Ignoring outgoing transfer");
            return Ok(ReconcileOutcome::Ignored {
                reason: format!("transfer type {:?} is not incoming", notification.transfer_type),
            });
        }

        let Some(transaction) = self.locate(notification).await? else {
            info!(gateway_id = %notification.id, "No pending top-up matches this transfer");
            return Ok(ReconcileOutcome::Ignored {
                reason: "no transaction matches the transfer".to_string(),
            });
        };

        match transaction.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Completed => {
                debug!(reference = %transaction.reference, "Duplicate delivery for completed top-up");
                return Ok(ReconcileOutcome::Acknowledged {
                    reference: transaction.reference,
                    applied: false,
                });
            }
            status @ (TransactionStatus::Failed | TransactionStatus::Refunded) => {
                info!(reference = %transaction.reference, %status, "Transfer matches a closed top-up");
                return Ok(ReconcileOutcome::Ignored {
                    reason: format!("transaction {} is {status}", transaction.reference),
                });
            }
        }

        if transaction.amount != notification.transfer_amount {
            warn!(
                reference = %transaction.reference,
                expected = %transaction.amount,
                received = %notification.transfer_amount,
                "Transfer amount does not match top-up, failing it"
            );
            let reason = format!("expected {}, received {}", transaction.amount, notification.transfer_amount);
            if let Err(e) = self.storage.fail_transaction(&transaction.reference, &reason).await {
                return self.storage_failure(&transaction.reference, e);
            }
            return Ok(ReconcileOutcome::Mismatched {
                reference: transaction.reference,
                expected: transaction.amount,
                received: notification.transfer_amount,
            });
        }

        let credit = self
            .storage
            .credit(CreditRequest {
                student_id: transaction.student_id,
                pages: transaction.pages,
                reference: transaction.reference.clone(),
                gateway_transaction_id: Some(notification.id.to_string()),
            })
            .await;

        match credit {
            Ok(outcome) => {
                if outcome.applied {
                    info!(
                        reference = %transaction.reference,
                        pages = transaction.pages,
                        balance = outcome.balance,
                        "Credited top-up"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_page_units("credit", transaction.pages);
                    }
                }
                Ok(ReconcileOutcome::Acknowledged {
                    reference: transaction.reference,
                    applied: outcome.applied,
                })
            }
            Err(e) => self.storage_failure(&transaction.reference, e),
        }
    }

    /// First candidate reference with a stored transaction.
    async fn locate(&self, notification: &GatewayNotification) -> Result<Option<TransactionDBResponse>, ReconcileError> {
        for candidate in self.candidates(notification) {
            if let Some(transaction) = self.storage.find_transaction(&candidate).await? {
                debug!(reference = %candidate, "Matched transfer to top-up");
                return Ok(Some(transaction));
            }
        }
        Ok(None)
    }

    /// Candidate references in priority order: the gateway's own code, payment codes found in
    /// the free-text fields, then the bank reference.
    fn candidates(&self, notification: &GatewayNotification) -> Vec<String> {
        let mut candidates = Vec::new();
        let mut push = |candidate: String| {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        };

        if let Some(code) = &notification.code {
            push(code.trim().to_ascii_uppercase());
        }
        for text in [&notification.content, &notification.description].into_iter().flatten() {
            for found in self.code_pattern.find_iter(text) {
                push(found.as_str().to_ascii_uppercase());
            }
        }
        if let Some(reference) = &notification.reference_code {
            push(reference.trim().to_string());
        }
        candidates
    }

    /// Store unavailability is retried by the gateway; anything else is an invariant surprise
    /// that needs a human and must not be redelivered forever.
    fn storage_failure(&self, reference: &str, err: StorageError) -> Result<ReconcileOutcome, ReconcileError> {
        match err {
            StorageError::Database(db) if db.is_unavailable() => Err(ReconcileError::Storage(StorageError::Database(db))),
            other => {
                error!(reference, "Top-up needs manual reconciliation: {}", other);
                Ok(ReconcileOutcome::Ignored {
                    reason: format!("transaction {reference} could not be applied"),
                })
            }
        }
    }
}

/// `<prefix>` followed by the random part, as a whole word, in any case.
fn payment_code_pattern(prefix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}[A-Z0-9]{{{CODE_LENGTH}}}\b", regex::escape(prefix)))
}
