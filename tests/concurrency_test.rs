mod common;

use std::sync::Arc;

use aerarium::application::ErrorKind;
use aerarium::domain::{TransactionRequest, TransactionStatus};
use anyhow::Result;
use common::{customer, open_funded_account, test_bank};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_conserve_total_balance() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let left = open_funded_account(&bank.service, &owner, 100_000).await?;
    let right = open_funded_account(&bank.service, &owner, 100_000).await?;

    let service = Arc::new(bank.service);
    let mut handles = Vec::new();

    for i in 0..20 {
        let service = service.clone();
        let (from, to) = if i % 2 == 0 {
            (left.account_number.clone(), right.account_number.clone())
        } else {
            (right.account_number.clone(), left.account_number.clone())
        };

        handles.push(tokio::spawn(async move {
            service
                .execute_transaction(
                    &owner,
                    TransactionRequest::Transfer {
                        sender_account_number: from,
                        receiver_account_number: to,
                        amount: 1_000,
                        description: None,
                    },
                )
                .await
        }));
    }

    for handle in handles {
        handle.await?.expect("transfer should settle");
    }

    let left = service.get_account(&left.account_number).await?;
    let right = service.get_account(&right.account_number).await?;

    // Money moved, none was created or destroyed.
    assert_eq!(left.balance + right.balance, 200_000);
    assert!(left.balance >= 0 && right.balance >= 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraft_attempts_settle_to_a_serial_order() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 10_000).await?;

    let service = Arc::new(bank.service);
    let mut handles = Vec::new();

    // Five withdrawals of 3000 against a balance of 10000: whatever the
    // interleaving, exactly three fit.
    for _ in 0..5 {
        let service = service.clone();
        let number = account.account_number.clone();
        handles.push(tokio::spawn(async move {
            service
                .execute_transaction(
                    &owner,
                    TransactionRequest::Withdrawal {
                        sender_account_number: number,
                        amount: 3_000,
                        description: None,
                    },
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
                rejections += 1;
            }
        }
    }

    assert_eq!(successes, 3);
    assert_eq!(rejections, 2);
    assert_eq!(
        service.get_account(&account.account_number).await?.balance,
        1_000
    );

    // Every attempt left exactly one terminal record.
    let history = service.list_user_transactions(&owner).await?;
    assert_eq!(history.len(), 5);
    assert_eq!(
        history
            .iter()
            .filter(|t| t.status == TransactionStatus::Failed)
            .count(),
        2
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_account_pairs_settle_independently() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();

    let a = open_funded_account(&bank.service, &owner, 50_000).await?;
    let b = open_funded_account(&bank.service, &owner, 0).await?;
    let c = open_funded_account(&bank.service, &owner, 50_000).await?;
    let d = open_funded_account(&bank.service, &owner, 0).await?;

    let service = Arc::new(bank.service);
    let mut handles = Vec::new();

    for (from, to) in [(&a, &b), (&c, &d)] {
        for _ in 0..10 {
            let service = service.clone();
            let from = from.account_number.clone();
            let to = to.account_number.clone();
            handles.push(tokio::spawn(async move {
                service
                    .execute_transaction(
                        &owner,
                        TransactionRequest::Transfer {
                            sender_account_number: from,
                            receiver_account_number: to,
                            amount: 2_000,
                            description: None,
                        },
                    )
                    .await
            }));
        }
    }

    for handle in handles {
        handle.await?.expect("transfer should settle");
    }

    for (from, to) in [(&a, &b), (&c, &d)] {
        let from = service.get_account(&from.account_number).await?;
        let to = service.get_account(&to.account_number).await?;
        assert_eq!(from.balance, 30_000);
        assert_eq!(to.balance, 20_000);
    }

    Ok(())
}
