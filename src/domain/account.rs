use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;
pub type UserId = Uuid;

/// Length of generated account numbers.
pub const ACCOUNT_NUMBER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Long-term holdings
    Savings,
    /// Day-to-day spending
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "savings" => Some(AccountType::Savings),
            "checking" => Some(AccountType::Checking),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Open for balance mutations
    Active,
    /// Suspended; must be unfrozen before any further movement
    Frozen,
    /// Terminal; a closed account is never resurrected
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "frozen" => Some(AccountStatus::Frozen),
            "closed" => Some(AccountStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status transition. Closing requires an explicit freeze step first
/// so an account with in-flight activity cannot be closed in one move.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    #[error("Account is already frozen or closed")]
    AlreadyFrozenOrClosed,

    #[error("Only frozen accounts can be unfrozen")]
    NotFrozen,

    #[error("Account must be frozen before it can be closed")]
    MustBeFrozenFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: UserId,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Cents,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with a zero balance. The account number is
    /// allocated by the caller so uniqueness can be checked against the store.
    pub fn new(owner_id: UserId, account_type: AccountType, account_number: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            account_number,
            account_type,
            balance: 0,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// active -> frozen
    pub fn freeze(&mut self) -> Result<(), StatusError> {
        match self.status {
            AccountStatus::Active => {
                self.status = AccountStatus::Frozen;
                Ok(())
            }
            AccountStatus::Frozen | AccountStatus::Closed => {
                Err(StatusError::AlreadyFrozenOrClosed)
            }
        }
    }

    /// frozen -> active, the only reverse edge in the machine
    pub fn unfreeze(&mut self) -> Result<(), StatusError> {
        match self.status {
            AccountStatus::Frozen => {
                self.status = AccountStatus::Active;
                Ok(())
            }
            _ => Err(StatusError::NotFrozen),
        }
    }

    /// frozen -> closed (terminal)
    pub fn close(&mut self) -> Result<(), StatusError> {
        match self.status {
            AccountStatus::Frozen => {
                self.status = AccountStatus::Closed;
                Ok(())
            }
            _ => Err(StatusError::MustBeFrozenFirst),
        }
    }
}

/// Generate a candidate account number of [`ACCOUNT_NUMBER_LEN`] decimal
/// digits. Uniqueness is checked against the store by the caller, which
/// regenerates on collision.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCOUNT_NUMBER_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
