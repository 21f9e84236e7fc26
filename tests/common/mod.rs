// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use aerarium::application::BankService;
use aerarium::domain::{Account, AccountType, Cents, Principal};
use aerarium::events::{EventPublisher, InMemoryBus};
use anyhow::Result;
use tempfile::TempDir;
use uuid::Uuid;

/// A service wired to a temporary database and a connected in-memory bus.
/// Keep the struct alive for the whole test: dropping `temp` removes the
/// database file, dropping `bus` closes the event stream.
pub struct TestBank {
    pub service: BankService,
    pub bus: Arc<InMemoryBus>,
    pub temp: TempDir,
}

/// Helper to create a test service with a temporary database.
pub async fn test_bank() -> Result<TestBank> {
    let temp = TempDir::new()?;
    let db_path = temp.path().join("test.db");

    let bus = Arc::new(InMemoryBus::new());
    bus.connect();
    let publisher = EventPublisher::new(bus.clone()).with_retry(2, Duration::from_millis(5));

    let service = BankService::init(db_path.to_str().unwrap(), publisher).await?;
    Ok(TestBank { service, bus, temp })
}

/// A fresh customer principal, as the gateway would forward it.
pub fn customer() -> Principal {
    Principal::customer(Uuid::new_v4())
}

/// A fresh administrator principal.
pub fn admin() -> Principal {
    Principal::admin(Uuid::new_v4())
}

/// Open a checking account for the principal and credit it with `amount`.
pub async fn open_funded_account(
    service: &BankService,
    principal: &Principal,
    amount: Cents,
) -> Result<Account> {
    let account = service
        .create_account(principal, AccountType::Checking)
        .await?;
    if amount > 0 {
        let funded = service
            .fund_account(principal, &account.account_number, amount)
            .await?;
        return Ok(funded);
    }
    Ok(account)
}
