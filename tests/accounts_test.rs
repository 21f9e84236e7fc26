mod common;

use aerarium::application::{AppError, ErrorKind};
use aerarium::domain::{AccountStatus, AccountType, StatusError};
use anyhow::Result;
use common::{admin, customer, open_funded_account, test_bank};

#[tokio::test]
async fn test_new_account_is_active_with_zero_balance() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();

    let account = bank
        .service
        .create_account(&owner, AccountType::Savings)
        .await?;

    assert_eq!(account.owner_id, owner.user_id);
    assert_eq!(account.account_type, AccountType::Savings);
    assert_eq!(account.balance, 0);
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.account_number.len(), 10);
    assert!(account.account_number.chars().all(|c| c.is_ascii_digit()));

    // The record is persisted and queryable by number.
    let fetched = bank.service.get_account(&account.account_number).await?;
    assert_eq!(fetched.id, account.id);

    Ok(())
}

#[tokio::test]
async fn test_account_numbers_are_unique() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();

    let first = bank
        .service
        .create_account(&owner, AccountType::Checking)
        .await?;
    let second = bank
        .service
        .create_account(&owner, AccountType::Checking)
        .await?;

    assert_ne!(first.account_number, second.account_number);

    let accounts = bank.service.list_accounts(&owner).await?;
    assert_eq!(accounts.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_fund_account_updates_balance() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    let funded = bank
        .service
        .fund_account(&owner, &account.account_number, 5000)
        .await?;
    assert_eq!(funded.balance, 5000);

    let funded = bank
        .service
        .fund_account(&owner, &account.account_number, 2500)
        .await?;
    assert_eq!(funded.balance, 7500);

    Ok(())
}

#[tokio::test]
async fn test_fund_rejects_non_positive_amounts() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    for amount in [0, -100] {
        let err = bank
            .service
            .fund_account(&owner, &account.account_number, amount)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(
        bank.service
            .get_account(&account.account_number)
            .await?
            .balance,
        0
    );

    Ok(())
}

#[tokio::test]
async fn test_fund_is_owner_only() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let stranger = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    let err = bank
        .service
        .fund_account(&stranger, &account.account_number, 1000)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    Ok(())
}

#[tokio::test]
async fn test_funding_a_frozen_account_is_a_conflict() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 1000).await?;

    bank.service.freeze_account(&account.account_number).await?;

    let err = bank
        .service
        .fund_account(&owner, &account.account_number, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FundingNotActive { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.to_string(), "Cannot fund a non-active account");

    // Balance untouched, and funding created no transaction record.
    let account = bank.service.get_account(&account.account_number).await?;
    assert_eq!(account.balance, 1000);
    assert!(bank.service.list_user_transactions(&owner).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_balance_is_owner_only_and_active_only() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let stranger = customer();
    let account = open_funded_account(&bank.service, &owner, 4200).await?;

    assert_eq!(
        bank.service
            .get_balance(&owner, &account.account_number)
            .await?,
        4200
    );

    let err = bank
        .service
        .get_balance(&stranger, &account.account_number)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    bank.service.freeze_account(&account.account_number).await?;
    let err = bank
        .service
        .get_balance(&owner, &account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BalanceNotActive { .. }));

    Ok(())
}

#[tokio::test]
async fn test_close_requires_freeze_first() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    // Closing an active account is rejected outright.
    let err = bank
        .service
        .close_account(&account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::IllegalTransition(StatusError::MustBeFrozenFirst)
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Freeze, then close succeeds and persists.
    let frozen = bank.service.freeze_account(&account.account_number).await?;
    assert_eq!(frozen.status, AccountStatus::Frozen);

    let closed = bank.service.close_account(&account.account_number).await?;
    assert_eq!(closed.status, AccountStatus::Closed);

    let fetched = bank.service.get_account(&account.account_number).await?;
    assert_eq!(fetched.status, AccountStatus::Closed);

    Ok(())
}

#[tokio::test]
async fn test_freeze_and_unfreeze_edges() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    // Unfreezing an active account is illegal.
    let err = bank
        .service
        .unfreeze_account(&account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::IllegalTransition(StatusError::NotFrozen)
    ));

    bank.service.freeze_account(&account.account_number).await?;

    // Freezing twice is illegal.
    let err = bank
        .service
        .freeze_account(&account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::IllegalTransition(StatusError::AlreadyFrozenOrClosed)
    ));

    // The only reverse edge: frozen -> active.
    let reopened = bank
        .service
        .unfreeze_account(&account.account_number)
        .await?;
    assert_eq!(reopened.status, AccountStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_closed_accounts_stay_closed() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    bank.service.freeze_account(&account.account_number).await?;
    bank.service.close_account(&account.account_number).await?;

    let err = bank
        .service
        .unfreeze_account(&account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::IllegalTransition(StatusError::NotFrozen)
    ));

    Ok(())
}

#[tokio::test]
async fn test_delete_requires_admin_role() -> Result<()> {
    let bank = test_bank().await?;
    let owner = customer();
    let account = open_funded_account(&bank.service, &owner, 0).await?;

    let err = bank
        .service
        .delete_account(&owner, &account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AdminRequired));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // Administrative delete works regardless of status.
    bank.service
        .delete_account(&admin(), &account.account_number)
        .await?;

    let err = bank
        .service
        .get_account(&account.account_number)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_delete_unknown_account_is_not_found() -> Result<()> {
    let bank = test_bank().await?;

    let err = bank
        .service
        .delete_account(&admin(), "0000000000")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}
