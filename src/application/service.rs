use anyhow::Context;
use chrono::Utc;

use crate::domain::{
    generate_account_number, Account, AccountType, Cents, Principal, Transaction, TransactionId,
    TransactionRequest,
};
use crate::events::{
    AccountFunded, DomainEvent, EventPublisher, TransactionCompleted, TransactionFailed,
};
use crate::storage::{DbTransaction, DeltaOutcome, DeltaRejection, Repository};

use super::{AppError, ErrorKind};

/// Attempts to allocate a fresh account number before giving up. Collisions
/// on a 10-digit space are rare enough that hitting this bound means the
/// store is effectively full.
const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Application service providing the account store, the status state machine
/// and the transaction coordinator. This is the primary interface for any
/// client (CLI, gateway, tests).
///
/// Every operation takes the [`Principal`] the external auth collaborator
/// verified for the request; identity is trusted, never re-checked here.
pub struct BankService {
    repo: Repository,
    publisher: EventPublisher,
}

impl BankService {
    /// Create a new service over an already-connected repository.
    pub fn new(repo: Repository, publisher: EventPublisher) -> Self {
        Self { repo, publisher }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, publisher: EventPublisher) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, publisher))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, publisher: EventPublisher) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, publisher))
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account for the requesting user: zero balance, active, with
    /// a freshly generated account number (regenerated on collision).
    pub async fn create_account(
        &self,
        principal: &Principal,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        for _ in 0..MAX_NUMBER_ATTEMPTS {
            let number = generate_account_number();
            if self.repo.account_number_taken(&number).await? {
                continue;
            }
            let account = Account::new(principal.user_id, account_type, number);
            self.repo.save_account(&account).await?;
            return Ok(account);
        }

        Err(AppError::Database(anyhow::anyhow!(
            "Could not allocate a unique account number"
        )))
    }

    /// Get an account by its number.
    pub async fn get_account(&self, account_number: &str) -> Result<Account, AppError> {
        self.require_account(account_number).await
    }

    /// List the requesting user's accounts.
    pub async fn list_accounts(&self, principal: &Principal) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts_for_owner(principal.user_id).await?)
    }

    /// active -> frozen
    pub async fn freeze_account(&self, account_number: &str) -> Result<Account, AppError> {
        let mut account = self.require_account(account_number).await?;
        account.freeze()?;
        self.repo.update_account_status(&mut account).await?;
        Ok(account)
    }

    /// frozen -> active
    pub async fn unfreeze_account(&self, account_number: &str) -> Result<Account, AppError> {
        let mut account = self.require_account(account_number).await?;
        account.unfreeze()?;
        self.repo.update_account_status(&mut account).await?;
        Ok(account)
    }

    /// frozen -> closed. Closing always requires an explicit freeze first.
    pub async fn close_account(&self, account_number: &str) -> Result<Account, AppError> {
        let mut account = self.require_account(account_number).await?;
        account.close()?;
        self.repo.update_account_status(&mut account).await?;
        Ok(account)
    }

    /// Administrative removal of an account record, independent of its
    /// status. The role arrives verified from the auth collaborator.
    pub async fn delete_account(
        &self,
        principal: &Principal,
        account_number: &str,
    ) -> Result<(), AppError> {
        if !principal.is_admin() {
            return Err(AppError::AdminRequired);
        }
        if self.repo.delete_account(account_number).await? {
            Ok(())
        } else {
            Err(AppError::AccountNotFound(account_number.to_string()))
        }
    }

    /// Credit an account owned by the requesting user. The credit goes
    /// through the same guarded delta primitive as settlements, inside its
    /// own database transaction; the `AccountFunded` event carries the
    /// committed balance.
    pub async fn fund_account(
        &self,
        principal: &Principal,
        account_number: &str,
        amount: Cents,
    ) -> Result<Account, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(amount));
        }

        let mut dbtx = self.repo.begin().await?;
        let funded = self
            .apply_funding(&mut dbtx, principal, account_number, amount)
            .await;

        match funded {
            Ok(account) => {
                dbtx.commit().await.context("Failed to commit settlement")?;
                self.publish_funded(principal, &account, amount).await;
                Ok(account)
            }
            Err(err) => {
                if let Err(rollback_err) = dbtx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback after aborted funding failed");
                }
                Err(err)
            }
        }
    }

    async fn apply_funding(
        &self,
        dbtx: &mut DbTransaction,
        principal: &Principal,
        account_number: &str,
        amount: Cents,
    ) -> Result<Account, AppError> {
        let account = Repository::fetch_account(&mut *dbtx, account_number)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_number.to_string()))?;

        if account.owner_id != principal.user_id {
            return Err(AppError::AccessDenied(account_number.to_string()));
        }
        if !account.is_active() {
            return Err(AppError::FundingNotActive {
                account_number: account.account_number,
                status: account.status,
            });
        }

        self.apply_delta(dbtx, account_number, amount).await
    }

    /// Current balance of an account owned by the requesting user.
    pub async fn get_balance(
        &self,
        principal: &Principal,
        account_number: &str,
    ) -> Result<Cents, AppError> {
        let account = self.require_account(account_number).await?;
        if account.owner_id != principal.user_id {
            return Err(AppError::AccessDenied(account_number.to_string()));
        }
        if !account.is_active() {
            return Err(AppError::BalanceNotActive {
                account_number: account.account_number,
                status: account.status,
            });
        }
        Ok(account.balance)
    }

    // ========================
    // Transaction coordinator
    // ========================

    /// Turn a deposit/withdrawal/transfer request into exactly one terminal
    /// transaction record and, on success, a consistent balance change.
    ///
    /// Shape and amount are validated before any lookup; rejected requests
    /// leave no trace. Accepted requests run inside one database transaction;
    /// on abort it is rolled back in full and a failed audit record is written
    /// separately. The completion event is published only after commit, and a
    /// publish failure never reverses the committed ledger state.
    pub async fn execute_transaction(
        &self,
        principal: &Principal,
        request: TransactionRequest,
    ) -> Result<Transaction, AppError> {
        if request.amount() <= 0 {
            return Err(AppError::InvalidAmount(request.amount()));
        }
        if let Some(field) = request.missing_reference() {
            return Err(AppError::MissingAccountReference {
                tx_type: request.tx_type(),
                field,
            });
        }

        match self.settle(principal, &request).await {
            Ok(transaction) => {
                self.publish_completed(principal, &request).await;
                Ok(transaction)
            }
            Err(err) => {
                self.record_failure(principal, &request).await;

                if matches!(
                    err.kind(),
                    ErrorKind::NotFound | ErrorKind::InsufficientFunds
                ) {
                    self.publish_failed(principal, &request, &err).await;
                }

                if err.kind() == ErrorKind::Internal {
                    tracing::error!(
                        error = %err,
                        kind = %request.tx_type(),
                        amount = request.amount(),
                        initiator = %principal.user_id,
                        "transaction aborted by internal fault"
                    );
                    return Err(AppError::Internal);
                }
                Err(err)
            }
        }
    }

    /// Run the settlement inside a single database transaction and commit it.
    async fn settle(
        &self,
        principal: &Principal,
        request: &TransactionRequest,
    ) -> Result<Transaction, AppError> {
        let mut dbtx = self.repo.begin().await?;
        let settled = self.apply_request(&mut dbtx, principal, request).await;

        match settled {
            Ok(transaction) => {
                dbtx.commit().await.context("Failed to commit settlement")?;
                Ok(transaction)
            }
            Err(err) => {
                if let Err(rollback_err) = dbtx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback after aborted settlement failed");
                }
                Err(err)
            }
        }
    }

    async fn apply_request(
        &self,
        dbtx: &mut DbTransaction,
        principal: &Principal,
        request: &TransactionRequest,
    ) -> Result<Transaction, AppError> {
        let amount = request.amount();

        let transaction = match request {
            TransactionRequest::Transfer {
                sender_account_number,
                receiver_account_number,
                description,
                ..
            } => {
                let sender = self.resolve(dbtx, sender_account_number).await?;
                let receiver = self.resolve(dbtx, receiver_account_number).await?;

                if sender.balance < amount {
                    return Err(AppError::InsufficientBalance {
                        account_number: sender.account_number,
                        balance: sender.balance,
                        required: amount,
                    });
                }

                let sender = self.apply_delta(dbtx, &sender.account_number, -amount).await?;
                let receiver = self
                    .apply_delta(dbtx, &receiver.account_number, amount)
                    .await?;

                let mut transaction =
                    Transaction::successful(principal.user_id, request.tx_type(), amount)
                        .with_sender(&sender)
                        .with_receiver(&receiver);
                if let Some(desc) = description {
                    transaction = transaction.with_description(desc.clone());
                }
                transaction
            }

            TransactionRequest::Withdrawal {
                sender_account_number,
                description,
                ..
            } => {
                let sender = self.resolve(dbtx, sender_account_number).await?;

                if sender.balance < amount {
                    return Err(AppError::InsufficientBalance {
                        account_number: sender.account_number,
                        balance: sender.balance,
                        required: amount,
                    });
                }

                let sender = self.apply_delta(dbtx, &sender.account_number, -amount).await?;

                let mut transaction =
                    Transaction::successful(principal.user_id, request.tx_type(), amount)
                        .with_sender(&sender);
                if let Some(desc) = description {
                    transaction = transaction.with_description(desc.clone());
                }
                transaction
            }

            TransactionRequest::Deposit {
                receiver_account_number,
                description,
                ..
            } => {
                let receiver = self.resolve(dbtx, receiver_account_number).await?;
                let receiver = self
                    .apply_delta(dbtx, &receiver.account_number, amount)
                    .await?;

                let mut transaction =
                    Transaction::successful(principal.user_id, request.tx_type(), amount)
                        .with_receiver(&receiver);
                if let Some(desc) = description {
                    transaction = transaction.with_description(desc.clone());
                }
                transaction
            }
        };

        Repository::insert_transaction(&mut *dbtx, &transaction).await?;
        Ok(transaction)
    }

    async fn resolve(
        &self,
        dbtx: &mut DbTransaction,
        account_number: &str,
    ) -> Result<Account, AppError> {
        Repository::fetch_account(&mut *dbtx, account_number)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_number.to_string()))
    }

    /// Mutate a balance through the store's guarded primitive, mapping
    /// rejections onto the application taxonomy.
    async fn apply_delta(
        &self,
        dbtx: &mut DbTransaction,
        account_number: &str,
        delta: Cents,
    ) -> Result<Account, AppError> {
        match Repository::apply_delta(&mut *dbtx, account_number, delta).await? {
            DeltaOutcome::Applied(account) => Ok(account),
            DeltaOutcome::Rejected(DeltaRejection::NotFound) => {
                Err(AppError::AccountNotFound(account_number.to_string()))
            }
            DeltaOutcome::Rejected(DeltaRejection::NotActive(status)) => {
                Err(AppError::AccountNotActive {
                    account_number: account_number.to_string(),
                    status,
                })
            }
            DeltaOutcome::Rejected(DeltaRejection::WouldGoNegative { balance, delta }) => {
                Err(AppError::InsufficientBalance {
                    account_number: account_number.to_string(),
                    balance,
                    required: delta.abs(),
                })
            }
        }
    }

    /// Compensating audit write after a rolled-back settlement: a failed
    /// transaction record with the request's own type, amount and account
    /// numbers. Unconditional and deliberately outside the rolled-back
    /// transaction; its own failure is logged rather than masking the
    /// original error.
    async fn record_failure(&self, principal: &Principal, request: &TransactionRequest) {
        let mut audit = Transaction::failed(principal.user_id, request.tx_type(), request.amount())
            .with_description(request.description().unwrap_or("Transaction failed"));
        if let Some(number) = request.sender_account_number() {
            audit = audit.with_sender_number(number);
        }
        if let Some(number) = request.receiver_account_number() {
            audit = audit.with_receiver_number(number);
        }

        if let Err(err) = self.repo.save_transaction(&audit).await {
            tracing::error!(error = %err, "failed to write failed-transaction audit record");
        }
    }

    // ========================
    // Transaction queries
    // ========================

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    /// List transactions touching one of the requesting user's accounts.
    pub async fn list_transactions(
        &self,
        principal: &Principal,
        account_number: &str,
    ) -> Result<Vec<Transaction>, AppError> {
        let account = self.require_account(account_number).await?;
        if account.owner_id != principal.user_id {
            return Err(AppError::AccessDenied(account_number.to_string()));
        }
        Ok(self.repo.list_transactions_for_account(account.id).await?)
    }

    /// List every transaction the requesting user initiated, failed audit
    /// records included.
    pub async fn list_user_transactions(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self
            .repo
            .list_transactions_for_user(principal.user_id)
            .await?)
    }

    // ========================
    // Events
    // ========================

    async fn publish_completed(&self, principal: &Principal, request: &TransactionRequest) {
        self.emit(DomainEvent::TransactionCompleted(TransactionCompleted {
            user_id: principal.user_id,
            amount: request.amount(),
            tx_type: request.tx_type(),
            description: request.description().map(str::to_owned),
            status: "success".to_string(),
            timestamp: Utc::now(),
        }))
        .await;
    }

    async fn publish_failed(
        &self,
        principal: &Principal,
        request: &TransactionRequest,
        err: &AppError,
    ) {
        self.emit(DomainEvent::TransactionFailed(TransactionFailed {
            user_id: principal.user_id,
            amount: request.amount(),
            tx_type: request.tx_type(),
            reason: err.reason().to_string(),
            description: request
                .description()
                .unwrap_or("Transaction failed")
                .to_string(),
            status: "failed".to_string(),
            timestamp: Utc::now(),
        }))
        .await;
    }

    async fn publish_funded(&self, principal: &Principal, account: &Account, amount: Cents) {
        self.emit(DomainEvent::AccountFunded(AccountFunded {
            account_number: account.account_number.clone(),
            user_id: principal.user_id,
            amount,
            balance: account.balance,
            timestamp: Utc::now(),
        }))
        .await;
    }

    /// Publish failures are logged and swallowed: the ledger has already
    /// committed and stays authoritative even when the notification is lost.
    async fn emit(&self, event: DomainEvent) {
        let topic = event.topic();
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(topic, error = %err, "event publish failed; ledger state is already committed");
        }
    }

    async fn require_account(&self, account_number: &str) -> Result<Account, AppError> {
        self.repo
            .get_account_by_number(account_number)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_number.to_string()))
    }
}
