use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::BankService;
use crate::domain::{
    format_cents, parse_cents, AccountType, Principal, Transaction, TransactionRequest,
};
use crate::events::{EventBus, EventPublisher, InMemoryBus, NotificationConsumer};

/// Aerarium - event-driven banking ledger
///
/// The CLI stands in for the HTTP gateway: `--user` and `--admin` carry the
/// identity and role the gateway would have verified upstream.
#[derive(Parser)]
#[command(name = "aerarium")]
#[command(about = "A banking ledger with atomic settlement and event notifications")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "aerarium.db")]
    pub database: String,

    /// Authenticated user id, as verified by the gateway
    #[arg(short, long, global = true)]
    pub user: Option<Uuid>,

    /// Act with the administrator role (verified upstream)
    #[arg(long, global = true)]
    pub admin: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit money into an account
    Deposit {
        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        /// Receiving account number
        #[arg(long)]
        to: String,

        /// Description of the transaction
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,

        /// Source account number
        #[arg(long)]
        from: String,

        /// Description of the transaction
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Transfer money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account number
        #[arg(long)]
        from: String,

        /// Destination account number
        #[arg(long)]
        to: String,

        /// Description of the transaction
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// List transactions (your own, or one account's with --account)
    Transactions {
        /// Filter by account number
        #[arg(long)]
        account: Option<String>,
    },

    /// Show detailed transaction information
    #[command(name = "show")]
    ShowTransaction {
        /// Transaction ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account type: savings, checking
        #[arg(short = 't', long = "type")]
        account_type: String,
    },

    /// Show detailed account information
    Show {
        /// Account number
        number: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List your accounts
    List,

    /// Fund an account you own
    Fund {
        /// Account number
        number: String,

        /// Amount to credit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Show the balance of an account you own
    Balance {
        /// Account number
        number: String,
    },

    /// Freeze an active account
    Freeze {
        /// Account number
        number: String,
    },

    /// Unfreeze a frozen account
    Unfreeze {
        /// Account number
        number: String,
    },

    /// Close a frozen account (terminal)
    Close {
        /// Account number
        number: String,
    },

    /// Delete an account record (administrators only)
    Delete {
        /// Account number
        number: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // The bus and its consumer live for the whole process, mirroring a
        // broker client connected at startup and disconnected at shutdown.
        let bus = Arc::new(InMemoryBus::new());
        bus.connect();
        let notifications = tokio::spawn(NotificationConsumer::new(bus.subscribe()).run());
        let publisher = EventPublisher::new(bus.clone());

        let outcome = self.execute(publisher).await;

        // Dropping the last bus handle closes the stream; the consumer drains
        // buffered notifications and exits before the process does.
        drop(bus);
        let _ = notifications.await;
        outcome
    }

    async fn execute(self, publisher: EventPublisher) -> Result<()> {
        let Cli {
            database,
            user,
            admin,
            command,
        } = self;

        let principal = user.map(|user_id| {
            if admin {
                Principal::admin(user_id)
            } else {
                Principal::customer(user_id)
            }
        });

        match command {
            Commands::Init => {
                BankService::init(&database, publisher).await?;
                println!("Database initialized: {}", database);
            }

            Commands::Account(account_cmd) => {
                let service = BankService::connect(&database, publisher).await?;
                run_account_command(&service, require_principal(principal)?, account_cmd).await?;
            }

            Commands::Deposit {
                amount,
                to,
                description,
            } => {
                let service = BankService::connect(&database, publisher).await?;
                let request = TransactionRequest::Deposit {
                    receiver_account_number: to,
                    amount: parse_amount(&amount)?,
                    description,
                };
                let transaction = service
                    .execute_transaction(&require_principal(principal)?, request)
                    .await?;
                print_transaction(&transaction);
            }

            Commands::Withdraw {
                amount,
                from,
                description,
            } => {
                let service = BankService::connect(&database, publisher).await?;
                let request = TransactionRequest::Withdrawal {
                    sender_account_number: from,
                    amount: parse_amount(&amount)?,
                    description,
                };
                let transaction = service
                    .execute_transaction(&require_principal(principal)?, request)
                    .await?;
                print_transaction(&transaction);
            }

            Commands::Transfer {
                amount,
                from,
                to,
                description,
            } => {
                let service = BankService::connect(&database, publisher).await?;
                let request = TransactionRequest::Transfer {
                    sender_account_number: from,
                    receiver_account_number: to,
                    amount: parse_amount(&amount)?,
                    description,
                };
                let transaction = service
                    .execute_transaction(&require_principal(principal)?, request)
                    .await?;
                print_transaction(&transaction);
            }

            Commands::Transactions { account } => {
                let service = BankService::connect(&database, publisher).await?;
                let principal = require_principal(principal)?;
                let transactions = match account {
                    Some(number) => service.list_transactions(&principal, &number).await?,
                    None => service.list_user_transactions(&principal).await?,
                };

                if transactions.is_empty() {
                    println!("No transactions found.");
                } else {
                    println!(
                        "{:<38} {:<12} {:<12} {:<12}",
                        "ID", "TYPE", "STATUS", "AMOUNT"
                    );
                    println!("{}", "-".repeat(76));
                    for tx in transactions {
                        println!(
                            "{:<38} {:<12} {:<12} {:<12}",
                            tx.id,
                            tx.tx_type,
                            tx.status,
                            format_cents(tx.amount)
                        );
                    }
                }
            }

            Commands::ShowTransaction { id } => {
                let service = BankService::connect(&database, publisher).await?;
                let transaction_id = Uuid::parse_str(&id)
                    .context("Invalid transaction ID format (expected UUID)")?;
                let transaction = service.get_transaction(transaction_id).await?;
                print_transaction(&transaction);
            }
        }

        Ok(())
    }
}

fn require_principal(principal: Option<Principal>) -> Result<Principal> {
    principal.ok_or_else(|| {
        anyhow!("Missing --user: operations require the authenticated user id forwarded by the gateway")
    })
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).context("Invalid amount format. Use '50.00' or '50'")
}

async fn run_account_command(
    service: &BankService,
    principal: Principal,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Create { account_type } => {
            let account_type = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow!(
                    "Invalid account type '{}'. Valid types: savings, checking",
                    account_type
                )
            })?;

            let account = service.create_account(&principal, account_type).await?;
            println!(
                "Created account: {} ({})",
                account.account_number, account.account_type
            );
        }

        AccountCommands::Show { number, json } => {
            let account = service.get_account(&number).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                println!("Account: {}", account.account_number);
                println!("  ID:       {}", account.id);
                println!("  Owner:    {}", account.owner_id);
                println!("  Type:     {}", account.account_type);
                println!("  Status:   {}", account.status);
                println!("  Balance:  {}", format_cents(account.balance));
                println!(
                    "  Created:  {}",
                    account.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        AccountCommands::List => {
            let accounts = service.list_accounts(&principal).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<14} {:<10} {:<8} {:<12}", "NUMBER", "TYPE", "STATUS", "BALANCE");
                println!("{}", "-".repeat(46));
                for account in accounts {
                    println!(
                        "{:<14} {:<10} {:<8} {:<12}",
                        account.account_number,
                        account.account_type,
                        account.status,
                        format_cents(account.balance)
                    );
                }
            }
        }

        AccountCommands::Fund { number, amount } => {
            let amount = parse_amount(&amount)?;
            let account = service.fund_account(&principal, &number, amount).await?;
            println!(
                "Funded account {}: new balance {}",
                account.account_number,
                format_cents(account.balance)
            );
        }

        AccountCommands::Balance { number } => {
            let balance = service.get_balance(&principal, &number).await?;
            println!("{}", format_cents(balance));
        }

        AccountCommands::Freeze { number } => {
            let account = service.freeze_account(&number).await?;
            println!("Account {} is now {}", account.account_number, account.status);
        }

        AccountCommands::Unfreeze { number } => {
            let account = service.unfreeze_account(&number).await?;
            println!("Account {} is now {}", account.account_number, account.status);
        }

        AccountCommands::Close { number } => {
            let account = service.close_account(&number).await?;
            println!("Account {} is now {}", account.account_number, account.status);
        }

        AccountCommands::Delete { number } => {
            service.delete_account(&principal, &number).await?;
            println!("Deleted account: {}", number);
        }
    }

    Ok(())
}

fn print_transaction(transaction: &Transaction) {
    println!("Transaction: {}", transaction.id);
    println!("  Type:      {}", transaction.tx_type);
    println!("  Status:    {}", transaction.status);
    println!("  Amount:    {}", format_cents(transaction.amount));
    if let Some(sender) = &transaction.sender_account_number {
        println!("  From:      {}", sender);
    }
    if let Some(receiver) = &transaction.receiver_account_number {
        println!("  To:        {}", receiver);
    }
    if let Some(description) = &transaction.description {
        println!("  Note:      {}", description);
    }
    println!(
        "  Created:   {}",
        transaction.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}
