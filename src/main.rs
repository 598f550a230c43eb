use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use balance_book::{
    Account, AccountDeletePolicy, AccountForm, AccountId, AccountType, BalanceAudit,
    DEFAULT_LARGEST_EXPENSES, DEFAULT_TIMEZONE, Error, ErrorCategory, Ledger, LedgerConfig,
    Summary, SummaryFilter, Transaction, TransactionForm, TransactionId, TransactionType, UserId,
    init_logging, local_today,
};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Track accounts and transactions while keeping every balance in step with
/// its history.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// File path to the application SQLite database.
    #[arg(long, env = "BALANCE_BOOK_DB")]
    db_path: PathBuf,

    /// The canonical timezone used to decide what today is, e.g. "Pacific/Auckland".
    #[arg(long, env = "BALANCE_BOOK_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// The ID of the user performing the operation.
    #[arg(long, default_value_t = 1)]
    user_id: i64,

    /// Delete an account's transactions along with the account.
    #[arg(long)]
    cascade_deletes: bool,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Append debug logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Manage transactions.
    #[command(subcommand)]
    Transaction(TransactionCommand),
    /// Show income and expense totals.
    Summary(SummaryArgs),
    /// Check an account's balance against its transactions.
    Audit {
        /// The account to check.
        #[arg(long)]
        id: AccountId,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Open a new account.
    Create(AccountArgs),
    /// Change an account. A balance change is recorded as a transaction.
    Update {
        /// The account to change.
        #[arg(long)]
        id: AccountId,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Delete an account.
    Delete {
        /// The account to delete.
        #[arg(long)]
        id: AccountId,
    },
    /// List accounts by name.
    List,
}

#[derive(Args, Debug)]
struct AccountArgs {
    /// The display name of the account.
    #[arg(long)]
    name: Option<String>,
    /// One of cash, savings or checking.
    #[arg(long = "type", default_value = "checking")]
    account_type: AccountType,
    /// The opening balance, or the new balance when updating.
    #[arg(long, allow_hyphen_values = true)]
    balance: Option<Decimal>,
}

impl From<AccountArgs> for AccountForm {
    fn from(args: AccountArgs) -> Self {
        AccountForm {
            name: args.name,
            account_type: args.account_type,
            balance: args.balance,
        }
    }
}

#[derive(Subcommand, Debug)]
enum TransactionCommand {
    /// Record a transaction.
    Create(TransactionArgs),
    /// Change a transaction.
    Update {
        /// The transaction to change.
        #[arg(long)]
        id: TransactionId,
        #[command(flatten)]
        transaction: TransactionArgs,
    },
    /// Delete a transaction.
    Delete {
        /// The transaction to delete.
        #[arg(long)]
        id: TransactionId,
    },
    /// List transactions, newest first.
    List,
}

#[derive(Args, Debug)]
struct TransactionArgs {
    /// The account the money moved in or out of.
    #[arg(long, conflicts_with = "account")]
    account_id: Option<AccountId>,
    /// The name of the account the money moved in or out of.
    #[arg(long)]
    account: Option<String>,
    /// Either income or expense.
    #[arg(long = "type")]
    transaction_type: TransactionType,
    /// How much money moved.
    #[arg(long)]
    amount: Option<Decimal>,
    /// When the money moved, as YYYY-MM-DD. Defaults to today.
    #[arg(long, value_parser = parse_date)]
    date: Option<Date>,
    /// What the transaction was for.
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Only include transactions on or after this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    from: Option<Date>,
    /// Only include transactions on or before this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    to: Option<Date>,
    /// Only include these accounts. May be repeated.
    #[arg(long = "account-id")]
    account_ids: Vec<AccountId>,
    /// How many of the largest expenses to list.
    #[arg(long, default_value_t = DEFAULT_LARGEST_EXPENSES)]
    top: usize,
}

fn parse_date(text: &str) -> Result<Date, String> {
    Date::parse(text, DATE_FORMAT).map_err(|error| format!("invalid date \"{text}\": {error}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Could not open the log file: {error}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");

            match error.category() {
                ErrorCategory::Validation => ExitCode::from(2),
                ErrorCategory::Operation => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let policy = if cli.cascade_deletes {
        AccountDeletePolicy::Cascade
    } else {
        AccountDeletePolicy::Orphan
    };
    let config = LedgerConfig::new(&cli.timezone, policy)?;
    let connection = Connection::open(&cli.db_path)?;
    let ledger = Ledger::new(connection, config)?;
    let user_id = UserId::new(cli.user_id);
    let output = Output { json: cli.json };

    match cli.command {
        Command::Account(AccountCommand::Create(args)) => {
            let id = ledger.create_account(user_id, args.into())?;
            output.print_account(&ledger.get_account(user_id, id)?);
        }
        Command::Account(AccountCommand::Update { id, account }) => {
            let adjustment = ledger.update_account(user_id, id, account.into())?;
            output.print_account(&ledger.get_account(user_id, id)?);

            if let Some(transaction_id) = adjustment {
                output.print_transaction(&ledger.get_transaction(user_id, transaction_id)?);
            }
        }
        Command::Account(AccountCommand::Delete { id }) => {
            let cascaded = ledger.delete_account(user_id, id)?;
            output.print_message(&format!(
                "Deleted account {id} and {cascaded} of its transactions"
            ));
        }
        Command::Account(AccountCommand::List) => {
            output.print_accounts(&ledger.list_accounts_for_user(user_id)?);
        }
        Command::Transaction(TransactionCommand::Create(args)) => {
            let form = transaction_form(&ledger, user_id, args)?;
            let id = ledger.create_transaction(user_id, form)?;
            output.print_transaction(&ledger.get_transaction(user_id, id)?);
        }
        Command::Transaction(TransactionCommand::Update { id, transaction }) => {
            let form = transaction_form(&ledger, user_id, transaction)?;
            ledger.update_transaction(user_id, id, form)?;
            output.print_transaction(&ledger.get_transaction(user_id, id)?);
        }
        Command::Transaction(TransactionCommand::Delete { id }) => {
            ledger.delete_transaction(user_id, id)?;
            output.print_message(&format!("Deleted transaction {id}"));
        }
        Command::Transaction(TransactionCommand::List) => {
            output.print_transactions(&ledger.list_transactions_for_user(user_id)?);
        }
        Command::Summary(args) => {
            let date_range = match (args.from, args.to) {
                (None, None) => None,
                (from, to) => Some(from.unwrap_or(Date::MIN)..=to.unwrap_or(Date::MAX)),
            };
            let filter = SummaryFilter {
                date_range,
                account_ids: (!args.account_ids.is_empty()).then_some(args.account_ids),
                largest_expenses: args.top,
            };
            output.print_summary(&ledger.summarize(user_id, &filter)?);
        }
        Command::Audit { id } => {
            output.print_audit(id, &ledger.audit_account(user_id, id)?);
        }
    }

    Ok(())
}

fn transaction_form(
    ledger: &Ledger,
    user_id: UserId,
    args: TransactionArgs,
) -> Result<TransactionForm, Error> {
    let account_id = match (args.account_id, args.account) {
        (Some(id), _) => Some(id),
        (None, Some(name)) => Some(ledger.find_account_by_name(user_id, &name)?.id),
        (None, None) => None,
    };
    let date = match args.date {
        Some(date) => date,
        None => local_today(&ledger.config().local_timezone)?,
    };

    Ok(TransactionForm {
        account_id,
        transaction_type: args.transaction_type,
        date,
        amount: args.amount,
        note: args.note,
    })
}

/// Prints results either as JSON or as plain text.
struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(error) => eprintln!("Could not serialize output: {error}"),
        }
    }

    fn print_message(&self, message: &str) {
        if self.json {
            self.print_json(&serde_json::json!({ "message": message }));
        } else {
            println!("{message}");
        }
    }

    fn print_account(&self, account: &Account) {
        if self.json {
            self.print_json(account);
        } else {
            println!("{}", format_account(account));
        }
    }

    fn print_accounts(&self, accounts: &[Account]) {
        if self.json {
            self.print_json(accounts);
        } else if accounts.is_empty() {
            println!("No accounts yet.");
        } else {
            accounts
                .iter()
                .for_each(|account| println!("{}", format_account(account)));
        }
    }

    fn print_transaction(&self, transaction: &Transaction) {
        if self.json {
            self.print_json(transaction);
        } else {
            println!("{}", format_transaction(transaction));
        }
    }

    fn print_transactions(&self, transactions: &[Transaction]) {
        if self.json {
            self.print_json(transactions);
        } else if transactions.is_empty() {
            println!("No transactions yet.");
        } else {
            transactions
                .iter()
                .for_each(|transaction| println!("{}", format_transaction(transaction)));
        }
    }

    fn print_summary(&self, summary: &Summary) {
        if self.json {
            self.print_json(summary);
            return;
        }

        println!("Total income:   {:.2}", summary.total_income);
        println!("Total expenses: {:.2}", summary.total_expenses);
        println!("Net:            {:.2}", summary.net);
        println!("Total balance:  {:.2}", summary.total_balance);

        if !summary.largest_expenses.is_empty() {
            println!("Largest expenses:");
            summary
                .largest_expenses
                .iter()
                .for_each(|transaction| println!("  {}", format_transaction(transaction)));
        }
    }

    fn print_audit(&self, account_id: AccountId, audit: &BalanceAudit) {
        if self.json {
            self.print_json(audit);
            return;
        }

        match audit {
            BalanceAudit::Balanced { balance } => {
                println!("Account {account_id} is balanced at {balance:.2}")
            }
            BalanceAudit::Discrepancy {
                expected,
                actual,
                difference,
            } => println!(
                "Account {account_id} has a balance of {actual:.2} but its transactions add up to \
                 {expected:.2} (difference {difference:.2})"
            ),
        }
    }
}

fn format_account(account: &Account) -> String {
    format!(
        "#{:<4} {:<30} {:<8} {:>12.2}",
        account.id,
        account.name.as_ref(),
        account.account_type.as_str(),
        account.balance
    )
}

fn format_transaction(transaction: &Transaction) -> String {
    let signed = match transaction.transaction_type {
        TransactionType::Income => transaction.amount,
        TransactionType::Expense => -transaction.amount,
    };

    format!(
        "#{:<4} {} account {:<4} {:>12.2} {}",
        transaction.id,
        transaction.date,
        transaction.account_id,
        signed,
        transaction
            .note
            .as_ref()
            .map(|note| note.as_ref())
            .unwrap_or_default()
    )
}
