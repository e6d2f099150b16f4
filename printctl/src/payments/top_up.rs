//! Opening wallet top-ups.

use rand::prelude::RngExt;
use rand::rng;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::PaymentError;
use super::reconciler::CODE_LENGTH;
use crate::config::PaymentConfig;
use crate::db::errors::DbError;
use crate::db::models::transactions::{TransactionCreateDBRequest, TransactionDBResponse};
use crate::pricing::PageUnits;
use crate::storage::{Storage, StorageError};
use crate::types::{StudentId, abbrev_uuid};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Reference collisions are astronomically unlikely; a few retries cover them.
const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// Generate a payment code: the configured prefix followed by random uppercase alphanumerics.
pub fn generate_reference(prefix: &str) -> String {
    let mut rng = rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

/// Open a PENDING top-up of `pages` page units for `student_id`.
///
/// The amount is `pages × price_per_page`. The returned transaction's reference is the payment
/// code the student must include in their transfer.
#[instrument(skip(storage, config), fields(student = %abbrev_uuid(&student_id)), err)]
pub async fn open_top_up(
    storage: &dyn Storage,
    config: &PaymentConfig,
    student_id: StudentId,
    pages: PageUnits,
) -> Result<TransactionDBResponse, PaymentError> {
    if pages < 1 {
        return Err(PaymentError::InvalidPages(pages));
    }
    let amount = Decimal::from(pages)
        .checked_mul(config.price_per_page)
        .ok_or(PaymentError::AmountOverflow(pages))?;

    for _ in 0..MAX_REFERENCE_ATTEMPTS {
        let reference = generate_reference(&config.reference_prefix);
        let request = TransactionCreateDBRequest {
            student_id,
            amount,
            pages,
            payment_method: config.payment_method.clone(),
            reference,
        };

        match storage.open_transaction(request).await {
            Ok(transaction) => {
                info!(reference = %transaction.reference, pages, %amount, "Opened top-up");
                return Ok(transaction);
            }
            Err(StorageError::Database(DbError::UniqueViolation { constraint, .. }))
                if constraint.as_deref() == Some("transactions_reference_unique") =>
            {
                warn!("Generated payment reference collided, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(PaymentError::ReferenceExhausted)
}
