use thiserror::Error;

use crate::domain::{AccountStatus, Cents, StatusError, TransactionType};

/// Broad classification of an [`AppError`]. Callers can always tell a
/// business rejection (insufficient funds, unknown account, illegal status
/// transition) from a system fault by this kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    InsufficientFunds,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Amount must be greater than 0")]
    InvalidAmount(Cents),

    #[error("A {tx_type} requires a {field} account number")]
    MissingAccountReference {
        tx_type: TransactionType,
        field: &'static str,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Insufficient balance in account {account_number}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_number: String,
        balance: Cents,
        required: Cents,
    },

    #[error("Account {account_number} is not active (status: {status})")]
    AccountNotActive {
        account_number: String,
        status: AccountStatus,
    },

    #[error("Cannot fund a non-active account")]
    FundingNotActive {
        account_number: String,
        status: AccountStatus,
    },

    #[error("Cannot retrieve balance for a non-active account")]
    BalanceNotActive {
        account_number: String,
        status: AccountStatus,
    },

    #[error(transparent)]
    IllegalTransition(#[from] StatusError),

    #[error("Access denied: not your account")]
    AccessDenied(String),

    #[error("Only administrators can delete accounts")]
    AdminRequired,

    /// Opaque fault returned by the transaction coordinator. The underlying
    /// cause is logged, not surfaced.
    #[error("Transaction failed")]
    Internal,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount(_) | AppError::MissingAccountReference { .. } => {
                ErrorKind::Validation
            }
            AppError::AccountNotFound(_) | AppError::TransactionNotFound(_) => ErrorKind::NotFound,
            AppError::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
            AppError::AccountNotActive { .. }
            | AppError::FundingNotActive { .. }
            | AppError::BalanceNotActive { .. }
            | AppError::IllegalTransition(_) => ErrorKind::Conflict,
            AppError::AccessDenied(_) | AppError::AdminRequired => ErrorKind::Authorization,
            AppError::Internal | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Short, stable reason carried on `TransactionFailed` events. Kept free
    /// of per-request detail so downstream consumers can match on it.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InsufficientBalance { .. } => "Insufficient balance",
            AppError::AccountNotFound(_) => "Account not found",
            AppError::AccountNotActive { .. } => "Account not active",
            _ => "Transaction failed",
        }
    }
}
