//! In-memory storage implementation.
//!
//! All state sits behind one `parking_lot::Mutex`, so every operation is trivially atomic and
//! concurrent debits for the same student are serialised. Suitable for tests and
//! single-process deployments; everything is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{BalancePolicy, Result, Storage, StorageError};
use crate::db::errors::DbError;
use crate::db::models::{
    balances::PageBalanceDBResponse,
    documents::{DocumentCreateDBRequest, DocumentDBResponse},
    ledger::{LedgerEntryDBResponse, LedgerReason},
    print_jobs::{PrintJobCreateDBRequest, PrintJobDBResponse, PrintJobStatus},
    transactions::{CreditOutcome, CreditRequest, TransactionCreateDBRequest, TransactionDBResponse, TransactionStatus},
};
use crate::pricing::PageUnits;
use crate::types::{DocumentId, PrintJobId, StudentId, TransactionId};

#[derive(Default)]
struct State {
    documents: HashMap<DocumentId, DocumentDBResponse>,
    balances: HashMap<StudentId, PageBalanceDBResponse>,
    print_jobs: HashMap<PrintJobId, PrintJobDBResponse>,
    transactions: HashMap<TransactionId, TransactionDBResponse>,
    ledger: Vec<LedgerEntryDBResponse>,
}

impl State {
    fn balance_mut(&mut self, student_id: StudentId, policy: &BalancePolicy) -> &mut PageBalanceDBResponse {
        self.balances.entry(student_id).or_insert_with(|| PageBalanceDBResponse {
            student_id,
            balance: policy.default_allotment,
            default_allotment: policy.default_allotment,
            semester: policy.semester.clone(),
            updated_at: Utc::now(),
        })
    }

    /// Apply `delta` to a student's balance and append the matching ledger entry.
    fn apply(&mut self, student_id: StudentId, delta: PageUnits, source: Source, policy: &BalancePolicy) -> PageUnits {
        let balance = self.balance_mut(student_id, policy);
        balance.balance += delta;
        balance.updated_at = Utc::now();
        let balance_after = balance.balance;

        let (print_job_id, transaction_id, reason) = match source {
            Source::Debit(id) => (Some(id), None, LedgerReason::Debit),
            Source::Refund(id) => (Some(id), None, LedgerReason::Refund),
            Source::Credit(id) => (None, Some(id), LedgerReason::Credit),
        };
        let id = self.ledger.len() as i64 + 1;
        self.ledger.push(LedgerEntryDBResponse {
            id,
            student_id,
            delta,
            balance_after,
            print_job_id,
            transaction_id,
            reason,
            created_at: Utc::now(),
        });
        balance_after
    }

    fn transaction_by_reference(&mut self, reference: &str) -> Option<&mut TransactionDBResponse> {
        self.transactions.values_mut().find(|t| t.reference == reference)
    }
}

enum Source {
    Debit(PrintJobId),
    Refund(PrintJobId),
    Credit(TransactionId),
}

fn unique_violation(constraint: &str, table: &str, message: String) -> StorageError {
    StorageError::Database(DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message,
    })
}

/// In-memory implementation of the [`Storage`] trait.
#[derive(Clone)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
    policy: BalancePolicy,
}

impl InMemoryStorage {
    pub fn new(policy: BalancePolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            policy,
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn register_document(&self, request: DocumentCreateDBRequest) -> Result<DocumentDBResponse> {
        let document = DocumentDBResponse {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            stored_path: request.stored_path,
            file_type: request.file_type,
            original_name: request.original_name,
            page_count: None,
            normalized_path: None,
            created_at: Utc::now(),
        };
        self.state.lock().documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        Ok(self.state.lock().documents.get(&id).cloned())
    }

    async fn record_page_count(&self, id: DocumentId, page_count: i32, normalized_path: &str) -> Result<DocumentDBResponse> {
        let mut state = self.state.lock();
        let document = state.documents.get_mut(&id).ok_or_else(|| StorageError::NotFound {
            entity: "document",
            id: id.to_string(),
        })?;

        if document.page_count.is_none() {
            document.page_count = Some(page_count);
            document.normalized_path = Some(normalized_path.to_string());
        }
        Ok(document.clone())
    }

    async fn balance(&self, student_id: StudentId) -> Result<PageBalanceDBResponse> {
        let mut state = self.state.lock();
        Ok(state.balance_mut(student_id, &self.policy).clone())
    }

    async fn debit(&self, request: PrintJobCreateDBRequest) -> Result<PrintJobDBResponse> {
        let mut state = self.state.lock();

        if !state.documents.contains_key(&request.document_id) {
            return Err(StorageError::Database(DbError::ForeignKeyViolation {
                constraint: Some("print_jobs_document_id_fkey".to_string()),
                table: Some("print_jobs".to_string()),
                message: format!("document {} does not exist", request.document_id),
            }));
        }

        let available = state.balance_mut(request.student_id, &self.policy).balance;
        if available < request.cost {
            return Err(StorageError::InsufficientBalance {
                required: request.cost,
                available,
            });
        }

        let now = Utc::now();
        let job = PrintJobDBResponse {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            printer_id: request.printer_id,
            document_id: request.document_id,
            copies: request.copies,
            paper_size: request.paper_size,
            duplex: request.duplex,
            page_range: request.page_range,
            resolved_pages: request.resolved_pages,
            cost: request.cost,
            status: PrintJobStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.apply(job.student_id, -job.cost, Source::Debit(job.id), &self.policy);
        state.print_jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_print_job(&self, id: PrintJobId) -> Result<Option<PrintJobDBResponse>> {
        Ok(self.state.lock().print_jobs.get(&id).cloned())
    }

    async fn list_print_jobs(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<PrintJobDBResponse>> {
        let state = self.state.lock();
        let mut jobs: Vec<_> = state.print_jobs.values().filter(|j| j.student_id == student_id).cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(jobs.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn cancel_print_job(&self, student_id: StudentId, id: PrintJobId) -> Result<PrintJobDBResponse> {
        let mut state = self.state.lock();
        let job = match state.print_jobs.get_mut(&id) {
            Some(job) if job.student_id == student_id => job,
            _ => {
                return Err(StorageError::NotFound {
                    entity: "print job",
                    id: id.to_string(),
                });
            }
        };

        if job.status != PrintJobStatus::Pending {
            return Err(StorageError::InvalidTransition {
                entity: "print job",
                id: id.to_string(),
                from: job.status.to_string(),
                to: PrintJobStatus::Cancelled.to_string(),
            });
        }

        job.status = PrintJobStatus::Cancelled;
        job.updated_at = Utc::now();
        let job = job.clone();
        state.apply(student_id, job.cost, Source::Refund(job.id), &self.policy);
        Ok(job)
    }

    async fn open_transaction(&self, request: TransactionCreateDBRequest) -> Result<TransactionDBResponse> {
        let mut state = self.state.lock();
        if state.transaction_by_reference(&request.reference).is_some() {
            return Err(unique_violation(
                "transactions_reference_unique",
                "transactions",
                format!("reference {} already exists", request.reference),
            ));
        }

        let now = Utc::now();
        let transaction = TransactionDBResponse {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            amount: request.amount,
            pages: request.pages,
            status: TransactionStatus::Pending,
            payment_method: request.payment_method,
            reference: request.reference,
            gateway_transaction_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<TransactionDBResponse>> {
        Ok(self.state.lock().transaction_by_reference(reference).map(|t| t.clone()))
    }

    async fn list_transactions(&self, student_id: StudentId, skip: i64, limit: i64) -> Result<Vec<TransactionDBResponse>> {
        let state = self.state.lock();
        let mut transactions: Vec<_> = state
            .transactions
            .values()
            .filter(|t| t.student_id == student_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(transactions
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn credit(&self, request: CreditRequest) -> Result<CreditOutcome> {
        let mut state = self.state.lock();

        if let Some(gateway_id) = &request.gateway_transaction_id {
            let taken = state
                .transactions
                .values()
                .any(|t| t.reference != request.reference && t.gateway_transaction_id.as_deref() == Some(gateway_id.as_str()));
            if taken {
                return Err(unique_violation(
                    "transactions_gateway_transaction_id_unique",
                    "transactions",
                    format!("gateway transaction {gateway_id} already applied to another reference"),
                ));
            }
        }

        let transaction = state
            .transaction_by_reference(&request.reference)
            .ok_or_else(|| StorageError::NotFound {
                entity: "transaction",
                id: request.reference.clone(),
            })?;

        if transaction.student_id != request.student_id || transaction.pages != request.pages {
            return Err(StorageError::Conflict(format!(
                "credit for {} does not match the stored transaction",
                request.reference
            )));
        }

        match transaction.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Completed => {
                let transaction = transaction.clone();
                let balance = state.balance_mut(request.student_id, &self.policy).balance;
                return Ok(CreditOutcome {
                    applied: false,
                    balance,
                    transaction,
                });
            }
            status @ (TransactionStatus::Failed | TransactionStatus::Refunded) => {
                return Err(StorageError::InvalidTransition {
                    entity: "transaction",
                    id: request.reference.clone(),
                    from: status.to_string(),
                    to: TransactionStatus::Completed.to_string(),
                });
            }
        }

        transaction.status = TransactionStatus::Completed;
        transaction.gateway_transaction_id = request.gateway_transaction_id.clone();
        transaction.updated_at = Utc::now();
        let transaction = transaction.clone();

        let balance = state.apply(request.student_id, request.pages, Source::Credit(transaction.id), &self.policy);
        Ok(CreditOutcome {
            applied: true,
            balance,
            transaction,
        })
    }

    async fn fail_transaction(&self, reference: &str, reason: &str) -> Result<bool> {
        let mut state = self.state.lock();
        match state.transaction_by_reference(reference) {
            Some(transaction) if transaction.status == TransactionStatus::Pending => {
                transaction.status = TransactionStatus::Failed;
                transaction.failure_reason = Some(reason.to_string());
                transaction.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ledger_entries(&self, student_id: StudentId) -> Result<Vec<LedgerEntryDBResponse>> {
        Ok(self
            .state
            .lock()
            .ledger
            .iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect())
    }
}
