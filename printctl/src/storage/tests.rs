//! Behavioural tests shared by every storage backend.
//!
//! Each `run_test_*` function is executed against [`InMemoryStorage`] and, when a database is
//! available, against [`PostgresStorage`] (`cargo test -- --ignored` with `DATABASE_URL` set).

use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::postgres::PostgresStorage;
use super::{BalancePolicy, Storage, StorageError, in_memory::InMemoryStorage};
use crate::db::errors::DbError;
use crate::db::models::{
    documents::DocumentCreateDBRequest,
    ledger::LedgerReason,
    print_jobs::{PrintJobCreateDBRequest, PrintJobStatus},
    transactions::{CreditRequest, TransactionCreateDBRequest, TransactionStatus},
};
use crate::documents::DocumentFormat;
use crate::pricing::{PageUnits, PaperSize};
use crate::types::{DocumentId, StudentId};

const ALLOTMENT: PageUnits = 100;

fn policy() -> BalancePolicy {
    BalancePolicy {
        default_allotment: ALLOTMENT,
        semester: "2026-FALL".to_string(),
    }
}

#[fixture]
fn in_memory_storage() -> InMemoryStorage {
    InMemoryStorage::new(policy())
}

async fn register_document<S: Storage>(storage: &S, owner: StudentId) -> DocumentId {
    storage
        .register_document(DocumentCreateDBRequest {
            owner_id: owner,
            stored_path: format!("/uploads/{owner}/essay.docx"),
            file_type: DocumentFormat::Docx,
            original_name: Some("essay.docx".to_string()),
        })
        .await
        .unwrap()
        .id
}

fn print_job(student_id: StudentId, document_id: DocumentId, cost: PageUnits) -> PrintJobCreateDBRequest {
    PrintJobCreateDBRequest {
        student_id,
        printer_id: Uuid::new_v4(),
        document_id,
        copies: 1,
        paper_size: PaperSize::A4,
        duplex: false,
        page_range: "all".to_string(),
        resolved_pages: cost as i32,
        cost,
    }
}

async fn open_top_up<S: Storage>(storage: &S, student_id: StudentId, pages: PageUnits) -> String {
    let reference = format!("PRN{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase());
    storage
        .open_transaction(TransactionCreateDBRequest {
            student_id,
            amount: Decimal::new(pages * 500, 0),
            pages,
            payment_method: "bank_transfer".to_string(),
            reference: reference.clone(),
        })
        .await
        .unwrap();
    reference
}

fn credit_request(student_id: StudentId, pages: PageUnits, reference: &str) -> CreditRequest {
    CreditRequest {
        student_id,
        pages,
        reference: reference.to_string(),
        gateway_transaction_id: Some(format!("gw-{reference}")),
    }
}

async fn run_test_balance_is_provisioned_lazily<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();

    let balance = storage.balance(student).await.unwrap();

    assert_eq!(balance.balance, ALLOTMENT);
    assert_eq!(balance.default_allotment, ALLOTMENT);
    assert_eq!(balance.semester, "2026-FALL");
    assert!(storage.ledger_entries(student).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_balance_is_provisioned_lazily(in_memory_storage: InMemoryStorage) {
    run_test_balance_is_provisioned_lazily(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_balance_is_provisioned_lazily_postgres(pool: sqlx::PgPool) {
    run_test_balance_is_provisioned_lazily(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_debit_creates_pending_job<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;

    let job = storage.debit(print_job(student, document, 30)).await.unwrap();

    assert_eq!(job.status, PrintJobStatus::Pending);
    assert_eq!(job.cost, 30);
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT - 30);
    assert_eq!(storage.get_print_job(job.id).await.unwrap(), Some(job.clone()));

    let entries = storage.ledger_entries(student).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, -30);
    assert_eq!(entries[0].balance_after, ALLOTMENT - 30);
    assert_eq!(entries[0].print_job_id, Some(job.id));
    assert_eq!(entries[0].transaction_id, None);
    assert_eq!(entries[0].reason, LedgerReason::Debit);
}

#[rstest]
#[tokio::test]
async fn test_debit_creates_pending_job(in_memory_storage: InMemoryStorage) {
    run_test_debit_creates_pending_job(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_debit_creates_pending_job_postgres(pool: sqlx::PgPool) {
    run_test_debit_creates_pending_job(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_insufficient_balance_writes_nothing<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;

    let err = storage.debit(print_job(student, document, ALLOTMENT + 1)).await.unwrap_err();

    assert!(
        matches!(
            err,
            StorageError::InsufficientBalance {
                required,
                available: ALLOTMENT
            } if required == ALLOTMENT + 1
        ),
        "{err:?}"
    );
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT);
    assert!(storage.list_print_jobs(student, 0, 10).await.unwrap().is_empty());
    assert!(storage.ledger_entries(student).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_insufficient_balance_writes_nothing(in_memory_storage: InMemoryStorage) {
    run_test_insufficient_balance_writes_nothing(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_insufficient_balance_writes_nothing_postgres(pool: sqlx::PgPool) {
    run_test_insufficient_balance_writes_nothing(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_exact_balance_can_be_spent<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;

    storage.debit(print_job(student, document, ALLOTMENT)).await.unwrap();

    assert_eq!(storage.balance(student).await.unwrap().balance, 0);
    let err = storage.debit(print_job(student, document, 1)).await.unwrap_err();
    assert!(matches!(err, StorageError::InsufficientBalance { required: 1, available: 0 }), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn test_exact_balance_can_be_spent(in_memory_storage: InMemoryStorage) {
    run_test_exact_balance_can_be_spent(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_exact_balance_can_be_spent_postgres(pool: sqlx::PgPool) {
    run_test_exact_balance_can_be_spent(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_concurrent_debits_never_overdraw<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;
    // Provision first so both debits race on the same row
    storage.balance(student).await.unwrap();

    let (first, second) = tokio::join!(
        storage.debit(print_job(student, document, 60)),
        storage.debit(print_job(student, document, 60)),
    );

    let succeeded = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 1, "exactly one debit must win: {first:?} / {second:?}");
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(StorageError::InsufficientBalance { required: 60, available: 40 })));
    assert_eq!(storage.balance(student).await.unwrap().balance, 40);
}

#[rstest]
#[tokio::test]
async fn test_concurrent_debits_never_overdraw(in_memory_storage: InMemoryStorage) {
    run_test_concurrent_debits_never_overdraw(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_concurrent_debits_never_overdraw_postgres(pool: sqlx::PgPool) {
    run_test_concurrent_debits_never_overdraw(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_credit_is_applied_once<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let reference = open_top_up(storage, student, 50).await;

    let first = storage.credit(credit_request(student, 50, &reference)).await.unwrap();
    assert!(first.applied);
    assert_eq!(first.balance, ALLOTMENT + 50);
    assert_eq!(first.transaction.status, TransactionStatus::Completed);
    assert_eq!(first.transaction.gateway_transaction_id.as_deref(), Some(format!("gw-{reference}").as_str()));

    let second = storage.credit(credit_request(student, 50, &reference)).await.unwrap();
    assert!(!second.applied);
    assert_eq!(second.balance, ALLOTMENT + 50);

    let entries = storage.ledger_entries(student).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, LedgerReason::Credit);
    assert_eq!(entries[0].transaction_id, Some(first.transaction.id));
}

#[rstest]
#[tokio::test]
async fn test_credit_is_applied_once(in_memory_storage: InMemoryStorage) {
    run_test_credit_is_applied_once(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_credit_is_applied_once_postgres(pool: sqlx::PgPool) {
    run_test_credit_is_applied_once(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_concurrent_credits_apply_once<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let reference = open_top_up(storage, student, 25).await;

    let (a, b) = tokio::join!(
        storage.credit(credit_request(student, 25, &reference)),
        storage.credit(credit_request(student, 25, &reference)),
    );

    let applied = [a.unwrap().applied, b.unwrap().applied];
    assert_eq!(applied.iter().filter(|a| **a).count(), 1);
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT + 25);
}

#[rstest]
#[tokio::test]
async fn test_concurrent_credits_apply_once(in_memory_storage: InMemoryStorage) {
    run_test_concurrent_credits_apply_once(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_concurrent_credits_apply_once_postgres(pool: sqlx::PgPool) {
    run_test_concurrent_credits_apply_once(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_failed_transaction_cannot_be_credited<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let reference = open_top_up(storage, student, 10).await;

    assert!(storage.fail_transaction(&reference, "amount mismatch").await.unwrap());
    // Only PENDING transactions can fail
    assert!(!storage.fail_transaction(&reference, "again").await.unwrap());

    let failed = storage.find_transaction(&reference).await.unwrap().unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("amount mismatch"));

    let err = storage.credit(credit_request(student, 10, &reference)).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }), "{err:?}");
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT);
}

#[rstest]
#[tokio::test]
async fn test_failed_transaction_cannot_be_credited(in_memory_storage: InMemoryStorage) {
    run_test_failed_transaction_cannot_be_credited(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_failed_transaction_cannot_be_credited_postgres(pool: sqlx::PgPool) {
    run_test_failed_transaction_cannot_be_credited(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_credit_rejects_unknown_or_mismatched<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let err = storage.credit(credit_request(student, 10, "PRNNOPE0000")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }), "{err:?}");

    let reference = open_top_up(storage, student, 10).await;
    let err = storage.credit(credit_request(Uuid::new_v4(), 10, &reference)).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "{err:?}");
    let err = storage.credit(credit_request(student, 11, &reference)).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "{err:?}");

    assert_eq!(
        storage.find_transaction(&reference).await.unwrap().unwrap().status,
        TransactionStatus::Pending
    );
}

#[rstest]
#[tokio::test]
async fn test_credit_rejects_unknown_or_mismatched(in_memory_storage: InMemoryStorage) {
    run_test_credit_rejects_unknown_or_mismatched(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_credit_rejects_unknown_or_mismatched_postgres(pool: sqlx::PgPool) {
    run_test_credit_rejects_unknown_or_mismatched(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_duplicate_reference_is_rejected<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let reference = open_top_up(storage, student, 10).await;

    let err = storage
        .open_transaction(TransactionCreateDBRequest {
            student_id: student,
            amount: Decimal::new(5000, 0),
            pages: 10,
            payment_method: "bank_transfer".to_string(),
            reference,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Database(DbError::UniqueViolation { .. })), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn test_duplicate_reference_is_rejected(in_memory_storage: InMemoryStorage) {
    run_test_duplicate_reference_is_rejected(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_duplicate_reference_is_rejected_postgres(pool: sqlx::PgPool) {
    run_test_duplicate_reference_is_rejected(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_cancel_refunds_once<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;
    let job = storage.debit(print_job(student, document, 40)).await.unwrap();

    // Another student cannot see the job
    let err = storage.cancel_print_job(Uuid::new_v4(), job.id).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }), "{err:?}");

    let cancelled = storage.cancel_print_job(student, job.id).await.unwrap();
    assert_eq!(cancelled.status, PrintJobStatus::Cancelled);
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT);

    let err = storage.cancel_print_job(student, job.id).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }), "{err:?}");
    assert_eq!(storage.balance(student).await.unwrap().balance, ALLOTMENT);

    let reasons: Vec<_> = storage.ledger_entries(student).await.unwrap().iter().map(|e| e.reason).collect();
    assert_eq!(reasons, vec![LedgerReason::Debit, LedgerReason::Refund]);
}

#[rstest]
#[tokio::test]
async fn test_cancel_refunds_once(in_memory_storage: InMemoryStorage) {
    run_test_cancel_refunds_once(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_cancel_refunds_once_postgres(pool: sqlx::PgPool) {
    run_test_cancel_refunds_once(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_ledger_explains_balance<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;

    storage.debit(print_job(student, document, 30)).await.unwrap();
    let cancelled = storage.debit(print_job(student, document, 20)).await.unwrap();
    storage.cancel_print_job(student, cancelled.id).await.unwrap();
    let reference = open_top_up(storage, student, 15).await;
    storage.credit(credit_request(student, 15, &reference)).await.unwrap();
    storage.credit(credit_request(student, 15, &reference)).await.unwrap();

    let entries = storage.ledger_entries(student).await.unwrap();
    let total: PageUnits = entries.iter().map(|e| e.delta).sum();
    let balance = storage.balance(student).await.unwrap().balance;

    assert_eq!(balance, ALLOTMENT - 30 + 15);
    assert_eq!(ALLOTMENT + total, balance);
    assert_eq!(entries.last().map(|e| e.balance_after), Some(balance));
    for entry in &entries {
        assert!(entry.print_job_id.is_some() != entry.transaction_id.is_some());
    }
}

#[rstest]
#[tokio::test]
async fn test_ledger_explains_balance(in_memory_storage: InMemoryStorage) {
    run_test_ledger_explains_balance(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_ledger_explains_balance_postgres(pool: sqlx::PgPool) {
    run_test_ledger_explains_balance(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_page_count_is_recorded_once<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let document = register_document(storage, student).await;

    let first = storage.record_page_count(document, 12, "/uploads/essay.pdf").await.unwrap();
    assert_eq!(first.page_count, Some(12));
    assert_eq!(first.normalized_path.as_deref(), Some("/uploads/essay.pdf"));

    let second = storage.record_page_count(document, 13, "/tmp/other.pdf").await.unwrap();
    assert_eq!(second.page_count, Some(12));
    assert_eq!(second.normalized_path.as_deref(), Some("/uploads/essay.pdf"));

    let err = storage.record_page_count(Uuid::new_v4(), 1, "/x.pdf").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn test_page_count_is_recorded_once(in_memory_storage: InMemoryStorage) {
    run_test_page_count_is_recorded_once(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_page_count_is_recorded_once_postgres(pool: sqlx::PgPool) {
    run_test_page_count_is_recorded_once(&PostgresStorage::new(pool, policy())).await;
}

async fn run_test_listing_is_per_student_and_paginated<S: Storage>(storage: &S) {
    let student = Uuid::new_v4();
    let other = Uuid::new_v4();
    let document = register_document(storage, student).await;
    let other_document = register_document(storage, other).await;

    for _ in 0..3 {
        storage.debit(print_job(student, document, 1)).await.unwrap();
    }
    storage.debit(print_job(other, other_document, 1)).await.unwrap();
    open_top_up(storage, student, 5).await;

    assert_eq!(storage.list_print_jobs(student, 0, 10).await.unwrap().len(), 3);
    assert_eq!(storage.list_print_jobs(student, 1, 10).await.unwrap().len(), 2);
    assert_eq!(storage.list_print_jobs(student, 0, 2).await.unwrap().len(), 2);
    assert_eq!(storage.list_print_jobs(other, 0, 10).await.unwrap().len(), 1);
    assert_eq!(storage.list_transactions(student, 0, 10).await.unwrap().len(), 1);
    assert!(storage.list_transactions(other, 0, 10).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_listing_is_per_student_and_paginated(in_memory_storage: InMemoryStorage) {
    run_test_listing_is_per_student_and_paginated(&in_memory_storage).await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with a Postgres server"]
async fn test_listing_is_per_student_and_paginated_postgres(pool: sqlx::PgPool) {
    run_test_listing_is_per_student_and_paginated(&PostgresStorage::new(pool, policy())).await;
}
