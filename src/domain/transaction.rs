use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Account, AccountId, Cents, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "transfer" => Some(TransactionType::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Successful,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "successful" => Some(TransactionStatus::Successful),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempted movement of money, successful or not. Transactions are
/// append-only audit records: created once in a terminal status and never
/// updated afterwards. Failed attempts keep the literal account numbers from
/// the request even when the accounts themselves could not be resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub initiator_user_id: UserId,
    pub tx_type: TransactionType,
    pub amount: Cents,
    pub status: TransactionStatus,
    /// Source account (balance decreased), absent for deposits
    pub sender_account: Option<AccountId>,
    /// Destination account (balance increased), absent for withdrawals
    pub receiver_account: Option<AccountId>,
    pub sender_account_number: Option<String>,
    pub receiver_account_number: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        initiator_user_id: UserId,
        tx_type: TransactionType,
        amount: Cents,
        status: TransactionStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator_user_id,
            tx_type,
            amount,
            status,
            sender_account: None,
            receiver_account: None,
            sender_account_number: None,
            receiver_account_number: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    /// A settled transaction, written in the same commit as the balance
    /// changes it describes.
    pub fn successful(initiator_user_id: UserId, tx_type: TransactionType, amount: Cents) -> Self {
        Self::new(
            initiator_user_id,
            tx_type,
            amount,
            TransactionStatus::Successful,
        )
    }

    /// An audit record for a rejected or aborted request, written after the
    /// settlement rolled back.
    pub fn failed(initiator_user_id: UserId, tx_type: TransactionType, amount: Cents) -> Self {
        Self::new(initiator_user_id, tx_type, amount, TransactionStatus::Failed)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sender(mut self, account: &Account) -> Self {
        self.sender_account = Some(account.id);
        self.sender_account_number = Some(account.account_number.clone());
        self
    }

    pub fn with_receiver(mut self, account: &Account) -> Self {
        self.receiver_account = Some(account.id);
        self.receiver_account_number = Some(account.account_number.clone());
        self
    }

    pub fn with_sender_number(mut self, number: impl Into<String>) -> Self {
        self.sender_account_number = Some(number.into());
        self
    }

    pub fn with_receiver_number(mut self, number: impl Into<String>) -> Self {
        self.receiver_account_number = Some(number.into());
        self
    }
}

/// A settlement request, one variant per transaction type so each carries
/// exactly the account references that type requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TransactionRequest {
    Deposit {
        receiver_account_number: String,
        amount: Cents,
        #[serde(default)]
        description: Option<String>,
    },
    Withdrawal {
        sender_account_number: String,
        amount: Cents,
        #[serde(default)]
        description: Option<String>,
    },
    Transfer {
        sender_account_number: String,
        receiver_account_number: String,
        amount: Cents,
        #[serde(default)]
        description: Option<String>,
    },
}

impl TransactionRequest {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            TransactionRequest::Deposit { .. } => TransactionType::Deposit,
            TransactionRequest::Withdrawal { .. } => TransactionType::Withdrawal,
            TransactionRequest::Transfer { .. } => TransactionType::Transfer,
        }
    }

    pub fn amount(&self) -> Cents {
        match self {
            TransactionRequest::Deposit { amount, .. }
            | TransactionRequest::Withdrawal { amount, .. }
            | TransactionRequest::Transfer { amount, .. } => *amount,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TransactionRequest::Deposit { description, .. }
            | TransactionRequest::Withdrawal { description, .. }
            | TransactionRequest::Transfer { description, .. } => description.as_deref(),
        }
    }

    pub fn sender_account_number(&self) -> Option<&str> {
        match self {
            TransactionRequest::Deposit { .. } => None,
            TransactionRequest::Withdrawal {
                sender_account_number,
                ..
            }
            | TransactionRequest::Transfer {
                sender_account_number,
                ..
            } => Some(sender_account_number),
        }
    }

    pub fn receiver_account_number(&self) -> Option<&str> {
        match self {
            TransactionRequest::Withdrawal { .. } => None,
            TransactionRequest::Deposit {
                receiver_account_number,
                ..
            }
            | TransactionRequest::Transfer {
                receiver_account_number,
                ..
            } => Some(receiver_account_number),
        }
    }

    /// Returns the name of the first required account reference that is blank,
    /// if any. Requests with a missing reference are rejected before any
    /// lookup.
    pub fn missing_reference(&self) -> Option<&'static str> {
        match self {
            TransactionRequest::Deposit {
                receiver_account_number,
                ..
            } => receiver_account_number
                .trim()
                .is_empty()
                .then_some("receiver"),
            TransactionRequest::Withdrawal {
                sender_account_number,
                ..
            } => sender_account_number.trim().is_empty().then_some("sender"),
            TransactionRequest::Transfer {
                sender_account_number,
                receiver_account_number,
                ..
            } => {
                if sender_account_number.trim().is_empty() {
                    Some("sender")
                } else if receiver_account_number.trim().is_empty() {
                    Some("receiver")
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_transaction_record() {
        let user = Uuid::new_v4();
        let tx = Transaction::successful(user, TransactionType::Transfer, 5000)
            .with_description("Rent");

        assert_eq!(tx.initiator_user_id, user);
        assert_eq!(tx.amount, 5000);
        assert_eq!(tx.status, TransactionStatus::Successful);
        assert_eq!(tx.description, Some("Rent".to_string()));
        assert!(tx.sender_account.is_none());
    }

    #[test]
    fn test_failed_transaction_keeps_request_numbers() {
        let tx = Transaction::failed(Uuid::new_v4(), TransactionType::Transfer, 100)
            .with_sender_number("1111111111")
            .with_receiver_number("2222222222");

        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.sender_account_number.as_deref(), Some("1111111111"));
        assert_eq!(tx.receiver_account_number.as_deref(), Some("2222222222"));
        assert!(tx.sender_account.is_none());
        assert!(tx.receiver_account.is_none());
    }

    #[test]
    fn test_request_variant_fields() {
        let request = TransactionRequest::Transfer {
            sender_account_number: "1111111111".into(),
            receiver_account_number: "2222222222".into(),
            amount: 500,
            description: None,
        };

        assert_eq!(request.tx_type(), TransactionType::Transfer);
        assert_eq!(request.amount(), 500);
        assert_eq!(request.sender_account_number(), Some("1111111111"));
        assert_eq!(request.receiver_account_number(), Some("2222222222"));
        assert_eq!(request.missing_reference(), None);

        let deposit = TransactionRequest::Deposit {
            receiver_account_number: "2222222222".into(),
            amount: 500,
            description: None,
        };
        assert_eq!(deposit.sender_account_number(), None);
    }

    #[test]
    fn test_blank_references_are_reported() {
        let request = TransactionRequest::Withdrawal {
            sender_account_number: "  ".into(),
            amount: 500,
            description: None,
        };
        assert_eq!(request.missing_reference(), Some("sender"));

        let request = TransactionRequest::Transfer {
            sender_account_number: "1111111111".into(),
            receiver_account_number: String::new(),
            amount: 500,
            description: None,
        };
        assert_eq!(request.missing_reference(), Some("receiver"));
    }

    #[test]
    fn test_request_wire_shape_is_tagged_by_type() {
        let request = TransactionRequest::Deposit {
            receiver_account_number: "2222222222".into(),
            amount: 500,
            description: Some("Top up".into()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "deposit");
        assert_eq!(value["receiverAccountNumber"], "2222222222");
        assert_eq!(value["amount"], 500);

        // A variant missing its required reference is rejected at the boundary.
        let bogus = serde_json::json!({
            "type": "transfer",
            "receiverAccountNumber": "2222222222",
            "amount": 500,
        });
        assert!(serde_json::from_value::<TransactionRequest>(bogus).is_err());
    }
}
