use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStatus, AccountType, Cents, Transaction, TransactionId,
    TransactionStatus, TransactionType, UserId,
};

use super::MIGRATION_001_INITIAL;

/// An open database transaction: every read and write performed through it is
/// applied in full on commit or not at all on rollback.
pub type DbTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;

/// How long a caller may wait to begin a database transaction, and how long
/// SQLite may wait on a lock held by another process, before the request is
/// aborted.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a guarded balance mutation.
#[derive(Debug)]
pub enum DeltaOutcome {
    Applied(Account),
    Rejected(DeltaRejection),
}

/// Why a balance mutation was refused. The account row is untouched in every
/// case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaRejection {
    NotFound,
    NotActive(AccountStatus),
    WouldGoNegative { balance: Cents, delta: Cents },
}

/// Repository for persisting and querying accounts and transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::open(database_url, false).await
    }

    /// Initialize a new database (connect + migrate), creating the file if
    /// needed.
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::open(database_url, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(database_url: &str, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(ACQUIRE_TIMEOUT)
            .foreign_keys(true);

        // SQLite permits a single writer. Capping the pool at one connection
        // makes concurrent settlements queue on acquire instead of failing
        // with SQLITE_BUSY halfway through a lock upgrade; the acquire timeout
        // bounds how long a settlement may wait before its request is aborted.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Begin a database transaction spanning reads and writes of accounts and
    /// transaction records.
    pub async fn begin(&self) -> Result<DbTransaction> {
        self.pool
            .begin()
            .await
            .context("Failed to begin database transaction")
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account to the database.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, account_number, account_type, balance, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.owner_id.to_string())
        .bind(&account.account_number)
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .bind(account.status.as_str())
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Get an account by its account number.
    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::fetch_account(&mut conn, account_number).await
    }

    /// Get an account by number through an already-open transaction, so the
    /// row read belongs to it.
    pub async fn fetch_account(
        conn: &mut SqliteConnection,
        account_number: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, account_number, account_type, balance, status, created_at, updated_at
            FROM accounts
            WHERE account_number = ?
            "#,
        )
        .bind(account_number)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// Check whether an account number is already allocated.
    pub async fn account_number_taken(&self, account_number: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM accounts WHERE account_number = ? LIMIT 1")
            .bind(account_number)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check account number")?;
        Ok(row.is_some())
    }

    /// List all accounts owned by a user.
    pub async fn list_accounts_for_owner(&self, owner_id: UserId) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, account_number, account_type, balance, status, created_at, updated_at
            FROM accounts
            WHERE owner_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Persist a status change decided by the domain state machine. Balance is
    /// deliberately not touched here.
    pub async fn update_account_status(&self, account: &mut Account) -> Result<()> {
        account.updated_at = Utc::now();
        sqlx::query("UPDATE accounts SET status = ?, updated_at = ? WHERE account_number = ?")
            .bind(account.status.as_str())
            .bind(account.updated_at.to_rfc3339())
            .bind(&account.account_number)
            .execute(&self.pool)
            .await
            .context("Failed to update account status")?;
        Ok(())
    }

    /// Administrative hard delete, keyed by account number regardless of
    /// status. Returns whether a record matched.
    pub async fn delete_account(&self, account_number: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE account_number = ?")
            .bind(account_number)
            .execute(&self.pool)
            .await
            .context("Failed to delete account")?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a balance delta to an account, enforcing the store invariants:
    /// the account must exist, must be active, and the resulting balance must
    /// be non-negative. This is the only balance mutation in the crate.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        account_number: &str,
        delta: Cents,
    ) -> Result<DeltaOutcome> {
        let Some(account) = Self::fetch_account(conn, account_number).await? else {
            return Ok(DeltaOutcome::Rejected(DeltaRejection::NotFound));
        };

        if account.status != AccountStatus::Active {
            return Ok(DeltaOutcome::Rejected(DeltaRejection::NotActive(
                account.status,
            )));
        }

        let new_balance = account
            .balance
            .checked_add(delta)
            .context("Balance arithmetic overflow")?;
        if new_balance < 0 {
            return Ok(DeltaOutcome::Rejected(DeltaRejection::WouldGoNegative {
                balance: account.balance,
                delta,
            }));
        }

        let updated_at = Utc::now();
        sqlx::query("UPDATE accounts SET balance = ?, updated_at = ? WHERE account_number = ?")
            .bind(new_balance)
            .bind(updated_at.to_rfc3339())
            .bind(account_number)
            .execute(&mut *conn)
            .await
            .context("Failed to apply balance delta")?;

        Ok(DeltaOutcome::Applied(Account {
            balance: new_balance,
            updated_at,
            ..account
        }))
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");
        let type_str: String = row.get("account_type");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            owner_id: Uuid::parse_str(&owner_str).context("Invalid owner ID")?,
            account_number: row.get("account_number"),
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", type_str))?,
            balance: row.get("balance"),
            status: AccountStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account status: {}", status_str))?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .context("Invalid updated_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Insert a transaction record through an open database transaction,
    /// making it part of the same commit as the balance changes it describes.
    pub async fn insert_transaction(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, initiator_user_id, tx_type, amount, status, sender_account_id, receiver_account_id, sender_account_number, receiver_account_number, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.initiator_user_id.to_string())
        .bind(transaction.tx_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(transaction.sender_account.map(|id| id.to_string()))
        .bind(transaction.receiver_account.map(|id| id.to_string()))
        .bind(&transaction.sender_account_number)
        .bind(&transaction.receiver_account_number)
        .bind(&transaction.description)
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to insert transaction")?;
        Ok(())
    }

    /// Save a transaction record on its own connection. Used for the
    /// compensating failed-audit write after a rollback.
    pub async fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::insert_transaction(&mut conn, transaction).await
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, initiator_user_id, tx_type, amount, status, sender_account_id, receiver_account_id, sender_account_number, receiver_account_number, description, created_at
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    /// List transactions touching an account (as sender or receiver), oldest
    /// first.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        let id_str = account_id.to_string();
        let rows = sqlx::query(
            r#"
            SELECT id, initiator_user_id, tx_type, amount, status, sender_account_id, receiver_account_id, sender_account_number, receiver_account_number, description, created_at
            FROM transactions
            WHERE sender_account_id = ? OR receiver_account_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(&id_str)
        .bind(&id_str)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List every transaction a user initiated, including failed audit
    /// records whose accounts never resolved.
    pub async fn list_transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, initiator_user_id, tx_type, amount, status, sender_account_id, receiver_account_id, sender_account_number, receiver_account_number, description, created_at
            FROM transactions
            WHERE initiator_user_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for user")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let initiator_str: String = row.get("initiator_user_id");
        let type_str: String = row.get("tx_type");
        let status_str: String = row.get("status");
        let sender_id_str: Option<String> = row.get("sender_account_id");
        let receiver_id_str: Option<String> = row.get("receiver_account_id");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            initiator_user_id: Uuid::parse_str(&initiator_str).context("Invalid initiator ID")?,
            tx_type: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            amount: row.get("amount"),
            status: TransactionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            sender_account: sender_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid sender account ID")?,
            receiver_account: receiver_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid receiver account ID")?,
            sender_account_number: row.get("sender_account_number"),
            receiver_account_number: row.get("receiver_account_number"),
            description: row.get("description"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}
