//! PostgreSQL storage implementation.
//!
//! Every mutating operation runs inside one database transaction:
//!
//! - balance rows are provisioned with `INSERT ... ON CONFLICT DO NOTHING`
//! - debits use a conditional `UPDATE ... WHERE balance >= $cost`, which both locks the row and
//!   re-checks the balance after a concurrent debit commits
//! - credits and cancellations are guarded state transitions (`WHERE status = 'PENDING'`), so a
//!   concurrent duplicate sees zero affected rows instead of applying twice
//!
//! Queries are checked at runtime (`sqlx::query_as`), not with the compile-time macros.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{BalancePolicy, Result, Storage, StorageError};
use crate::db::models::{
    balances::PageBalanceDBResponse,
    documents::{DocumentCreateDBRequest, DocumentDBResponse},
    ledger::{LedgerEntryDBResponse, LedgerReason},
    print_jobs::{PrintJobCreateDBRequest, PrintJobDBResponse, PrintJobStatus},
    transactions::{CreditOutcome, CreditRequest, TransactionCreateDBRequest, TransactionDBResponse, TransactionStatus},
};
use crate::pricing::PageUnits;
use crate::types::{DocumentId, PrintJobId, StudentId, TransactionId};

const DOCUMENT_COLUMNS: &str = "id, owner_id, stored_path, file_type, original_name, page_count, normalized_path, created_at";
const PRINT_JOB_COLUMNS: &str =
    "id, student_id, printer_id, document_id, copies, paper_size, duplex, page_range, resolved_pages, cost, status, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, student_id, amount, pages, status, payment_method, reference, gateway_transaction_id, \
     failure_reason, created_at, updated_at";
const BALANCE_COLUMNS: &str = "student_id, balance, default_allotment, semester, updated_at";

/// PostgreSQL storage backend.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    policy: BalancePolicy,
}

impl PostgresStorage {
    pub fn new(pool: PgPool, policy: BalancePolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_balance(&self, conn: &mut PgConnection, student_id: StudentId) -> Result<()> {
        sqlx::query(
            "INSERT INTO page_balances (student_id, balance, default_allotment, semester)
             VALUES ($1, $2, $2, $3)
             ON CONFLICT (student_id) DO NOTHING",
        )
        .bind(student_id)
        .bind(self.policy.default_allotment)
        .bind(&self.policy.semester)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Add `delta` to a provisioned balance and write the ledger entry. Returns the new balance.
    async fn apply(
        conn: &mut PgConnection,
        student_id: StudentId,
        delta: PageUnits,
        print_job_id: Option<PrintJobId>,
        transaction_id: Option<TransactionId>,
        reason: LedgerReason,
    ) -> Result<PageUnits> {
        let balance_after: PageUnits = sqlx::query_scalar(
            "UPDATE page_balances SET balance = balance + $2, updated_at = NOW()
             WHERE student_id = $1
             RETURNING balance",
        )
        .bind(student_id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await?;

        insert_ledger_entry(conn, student_id, delta, balance_after, print_job_id, transaction_id, reason).await?;
        Ok(balance_after)
    }
}

async fn insert_ledger_entry(
    conn: &mut PgConnection,
    student_id: StudentId,
    delta: PageUnits,
    balance_after: PageUnits,
    print_job_id: Option<PrintJobId>,
    transaction_id: Option<TransactionId>,
    reason: LedgerReason,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO ledger_entries (student_id, delta, balance_after, print_job_id, transaction_id, reason)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(student_id)
    .bind(delta)
    .bind(balance_after)
    .bind(print_job_id)
    .bind(transaction_id)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn register_document(&self, request: DocumentCreateDBRequest) -> Result<DocumentDBResponse> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "INSERT INTO documents (id, owner_id, stored_path, file_type, original_name)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(&request.stored_path)
        .bind(request.file_type)
        .bind(&request.original_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(document)
    }

    async fn record_page_count(&self, id: DocumentId, page_count: i32, normalized_path: &str) -> Result<DocumentDBResponse> {
        let recorded = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "UPDATE documents SET page_count = $2, normalized_path = $3
             WHERE id = $1 AND page_count IS NULL
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(page_count)
        .bind(normalized_path)
        .fetch_optional(&self.pool)
        .await?;

        match recorded {
            Some(document) => Ok(document),
            // Lost the race, or the count was recorded earlier: keep the stored value
            None => self.get_document(id).await?.ok_or_else(|| StorageError::NotFound {
                entity: "document",
                id: id.to_string(),
            }),
        }
    }

    async fn balance(&self, student_id: StudentId) -> Result<PageBalanceDBResponse> {
        let mut conn = self.pool.acquire().await?;
        self.ensure_balance(&mut *conn, student_id).await?;
        let balance =
            sqlx::query_as::<_, PageBalanceDBResponse>(&format!("SELECT {BALANCE_COLUMNS} FROM page_balances WHERE student_id = $1"))
                .bind(student_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(balance)
    }

    async fn debit(&self, request: PrintJobCreateDBRequest) -> Result<PrintJobDBResponse> {
        let mut tx = self.pool.begin().await?;
        self.ensure_balance(&mut *tx, request.student_id).await?;

        let balance_after: Option<PageUnits> = sqlx::query_scalar(
            "UPDATE page_balances SET balance = balance - $2, updated_at = NOW()
             WHERE student_id = $1 AND balance >= $2
             RETURNING balance",
        )
        .bind(request.student_id)
        .bind(request.cost)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance_after) = balance_after else {
            let available: PageUnits = sqlx::query_scalar("SELECT balance FROM page_balances WHERE student_id = $1")
                .bind(request.student_id)
                .fetch_one(&mut *tx)
                .await?;
            // Dropping the transaction rolls back the provisioning insert as well
            return Err(StorageError::InsufficientBalance {
                required: request.cost,
                available,
            });
        };

        let job = sqlx::query_as::<_, PrintJobDBResponse>(&format!(
            "INSERT INTO print_jobs (id, student_id, printer_id, document_id, copies, paper_size, duplex, page_range, resolved_pages, cost, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {PRINT_JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.student_id)
        .bind(request.printer_id)
        .bind(request.document_id)
        .bind(request.copies)
        .bind(request.paper_size)
        .bind(request.duplex)
        .bind(&request.page_range)
        .bind(request.resolved_pages)
        .bind(request.cost)
        .bind(PrintJobStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        insert_ledger_entry(&mut *tx, job.student_id, -job.cost, balance_after, Some(job.id), None, LedgerReason::Debit).await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn get_print_job(&self, id: PrintJobId) -> Result<Option<PrintJobDBResponse>> {
        let job = sqlx::query_as::<_, PrintJobDBResponse>(&format!("SELECT {PRINT_JOB_COLUMNS} FROM print_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_print_jobs(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<PrintJobDBResponse>> {
        let jobs = sqlx::query_as::<_, PrintJobDBResponse>(&format!(
            "SELECT {PRINT_JOB_COLUMNS} FROM print_jobs
             WHERE student_id = $1
             ORDER BY created_at DESC, id DESC
             OFFSET $2
             LIMIT $3"
        ))
        .bind(student_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn cancel_print_job(&self, student_id: StudentId, id: PrintJobId) -> Result<PrintJobDBResponse> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_as::<_, PrintJobDBResponse>(&format!(
            "UPDATE print_jobs SET status = $3, updated_at = NOW()
             WHERE id = $1 AND student_id = $2 AND status = $4
             RETURNING {PRINT_JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(student_id)
        .bind(PrintJobStatus::Cancelled)
        .bind(PrintJobStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = cancelled else {
            return match self.get_print_job(id).await? {
                Some(job) if job.student_id == student_id => Err(StorageError::InvalidTransition {
                    entity: "print job",
                    id: id.to_string(),
                    from: job.status.to_string(),
                    to: PrintJobStatus::Cancelled.to_string(),
                }),
                _ => Err(StorageError::NotFound {
                    entity: "print job",
                    id: id.to_string(),
                }),
            };
        };

        Self::apply(&mut *tx, student_id, job.cost, Some(job.id), None, LedgerReason::Refund).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn open_transaction(&self, request: TransactionCreateDBRequest) -> Result<TransactionDBResponse> {
        let transaction = sqlx::query_as::<_, TransactionDBResponse>(&format!(
            "INSERT INTO transactions (id, student_id, amount, pages, status, payment_method, reference)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.student_id)
        .bind(request.amount)
        .bind(request.pages)
        .bind(TransactionStatus::Pending)
        .bind(&request.payment_method)
        .bind(&request.reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<TransactionDBResponse>> {
        let transaction =
            sqlx::query_as::<_, TransactionDBResponse>(&format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1"))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;
        Ok(transaction)
    }

    async fn list_transactions(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<TransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, TransactionDBResponse>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE student_id = $1
             ORDER BY created_at DESC, id DESC
             OFFSET $2
             LIMIT $3"
        ))
        .bind(student_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn credit(&self, request: CreditRequest) -> Result<CreditOutcome> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query_as::<_, TransactionDBResponse>(&format!(
            "UPDATE transactions
             SET status = $5, gateway_transaction_id = COALESCE($4, gateway_transaction_id), updated_at = NOW()
             WHERE reference = $1 AND student_id = $2 AND pages = $3 AND status = $6
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(&request.reference)
        .bind(request.student_id)
        .bind(request.pages)
        .bind(&request.gateway_transaction_id)
        .bind(TransactionStatus::Completed)
        .bind(TransactionStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transaction) = completed else {
            drop(tx);
            let existing = self.find_transaction(&request.reference).await?.ok_or_else(|| StorageError::NotFound {
                entity: "transaction",
                id: request.reference.clone(),
            })?;

            if existing.student_id != request.student_id || existing.pages != request.pages {
                return Err(StorageError::Conflict(format!(
                    "credit for {} does not match the stored transaction",
                    request.reference
                )));
            }
            return match existing.status {
                TransactionStatus::Completed => {
                    let balance = self.balance(request.student_id).await?.balance;
                    Ok(CreditOutcome {
                        applied: false,
                        balance,
                        transaction: existing,
                    })
                }
                status => Err(StorageError::InvalidTransition {
                    entity: "transaction",
                    id: request.reference.clone(),
                    from: status.to_string(),
                    to: TransactionStatus::Completed.to_string(),
                }),
            };
        };

        self.ensure_balance(&mut *tx, request.student_id).await?;
        let balance = Self::apply(&mut *tx, request.student_id, request.pages, None, Some(transaction.id), LedgerReason::Credit).await?;
        tx.commit().await?;

        Ok(CreditOutcome {
            applied: true,
            balance,
            transaction,
        })
    }

    async fn fail_transaction(&self, reference: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $3, failure_reason = $2, updated_at = NOW()
             WHERE reference = $1 AND status = $4",
        )
        .bind(reference)
        .bind(reason)
        .bind(TransactionStatus::Failed)
        .bind(TransactionStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn ledger_entries(&self, student_id: StudentId) -> Result<Vec<LedgerEntryDBResponse>> {
        let entries = sqlx::query_as::<_, LedgerEntryDBResponse>(
            "SELECT id, student_id, delta, balance_after, print_job_id, transaction_id, reason, created_at
             FROM ledger_entries
             WHERE student_id = $1
             ORDER BY id",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
