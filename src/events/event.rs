use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, TransactionType, UserId};

/// Domain events handed to the message bus after the ledger has committed.
/// Payloads are flat, JSON-serializable structures; consumers tolerate extra
/// fields but every listed field is always present.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    TransactionCompleted(TransactionCompleted),
    TransactionFailed(TransactionFailed),
    AccountFunded(AccountFunded),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::TransactionCompleted(_) => "TransactionCompleted",
            DomainEvent::TransactionFailed(_) => "TransactionFailed",
            DomainEvent::AccountFunded(_) => "AccountFunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCompleted {
    pub user_id: UserId,
    pub amount: Cents,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub description: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFailed {
    pub user_id: UserId,
    pub amount: Cents,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub reason: String,
    pub description: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFunded {
    pub account_number: String,
    pub user_id: UserId,
    pub amount: Cents,
    /// Balance of the account immediately after the funding commit.
    pub balance: Cents,
    pub timestamp: DateTime<Utc>,
}
