pub mod accounts;
pub mod budgets;
pub mod categories;
pub mod extract;
pub mod init;
pub mod reconcile;
pub mod recurring;
pub mod report;
pub mod status;
pub mod tx;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use pocketledger::fmt::parse_amount;
use pocketledger::models::{AccountKind, BudgetPeriod, CategoryKind, Cents, Frequency, TransactionKind};
use pocketledger::reports::SortOrder;
use pocketledger::settings::{load_settings, Settings};
use pocketledger::Ledger;

/// A `--month` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

fn parse_month(raw: &str) -> Result<YearMonth, String> {
    let invalid = || format!("'{raw}' is not a month (expected YYYY-MM, e.g. 2025-03)");
    let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    if !digits(year, 4) || !digits(month, 2) {
        return Err(invalid());
    }
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok(YearMonth { year, month })
}

pub(crate) fn split_month(month: Option<YearMonth>) -> (Option<i32>, Option<u32>) {
    match month {
        Some(m) => (Some(m.year), Some(m.month)),
        None => (None, None),
    }
}

fn parse_cents(raw: &str) -> Result<Cents, String> {
    parse_amount(raw).ok_or_else(|| format!("'{raw}' is not an amount (e.g. 1,250.50)"))
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Loads settings and opens the ledger they point at.
pub(crate) fn open_ledger() -> anyhow::Result<(Settings, Ledger)> {
    let settings = load_settings();
    let path = settings.db_path();
    let ledger = Ledger::open(&path, settings.store_options())
        .with_context(|| format!("opening ledger at {}", path.display()))?;
    Ok((settings, ledger))
}

#[derive(Parser)]
#[command(name = "pocketledger", about = "Personal finance ledger with recurring transactions and bank message intake.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for ledger data (default: ~/.config/pocketledger/data)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Record, edit and list transactions.
    Tx {
        #[command(subcommand)]
        command: TxCommands,
    },
    /// Manage recurring transactions.
    Recurring {
        #[command(subcommand)]
        command: RecurringCommands,
    },
    /// Set spending limits and check them.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Extract a transaction from bank notification text.
    Extract {
        /// Message sender, e.g. HDFCBK
        #[arg(long, default_value = "")]
        sender: String,
        /// Message text (read from stdin when omitted)
        #[arg(long)]
        body: Option<String>,
        /// Book the candidate when it meets the confidence threshold
        #[arg(long)]
        book: bool,
        /// Account id to book into (default: matched from the message)
        #[arg(long)]
        account: Option<i64>,
        /// Category id to book under (default: matched from the merchant)
        #[arg(long)]
        category: Option<i64>,
        /// Print the candidate as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare an account with an observed balance.
    Reconcile {
        /// Account id
        account: i64,
        /// Observed balance, e.g. 15,000.00
        #[arg(long, value_parser = parse_cents, allow_hyphen_values = true)]
        balance: Option<Cents>,
        /// Book the difference as an adjustment
        #[arg(long)]
        apply: bool,
        /// Show past reconciliations instead
        #[arg(long)]
        history: bool,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'HDFC Savings 1234'
        name: String,
        /// Account type: bank, credit_card, wallet, cash, other
        #[arg(long = "type", default_value = "bank")]
        kind: AccountKind,
        /// Opening balance
        #[arg(long, value_parser = parse_cents, allow_hyphen_values = true, default_value = "0")]
        opening: Cents,
    },
    /// List all accounts.
    List,
    /// Stop new transactions from landing on an account.
    Deactivate {
        id: i64,
    },
    /// Reactivate a deactivated account.
    Activate {
        id: i64,
    },
    /// Delete an account with all of its transactions and recurring rules.
    Delete {
        id: i64,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        name: String,
        /// expense or income
        #[arg(long, default_value = "expense")]
        kind: CategoryKind,
        /// Display color, e.g. '#FF6384'
        #[arg(long, default_value = "")]
        color: String,
    },
    /// List categories.
    List {
        #[arg(long)]
        kind: Option<CategoryKind>,
    },
    /// Delete a user category; its transactions become uncategorized.
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Record a transaction.
    Add {
        /// Account id
        #[arg(long)]
        account: i64,
        #[arg(long, value_parser = parse_cents)]
        amount: Cents,
        /// income, expense or transfer (default from settings)
        #[arg(long)]
        kind: Option<TransactionKind>,
        /// Destination account id for transfers
        #[arg(long)]
        to: Option<i64>,
        #[arg(long)]
        category: Option<i64>,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Change fields of a recorded transaction.
    Edit {
        id: i64,
        #[arg(long)]
        account: Option<i64>,
        #[arg(long, value_parser = parse_cents)]
        amount: Option<Cents>,
        #[arg(long)]
        kind: Option<TransactionKind>,
        #[arg(long)]
        to: Option<i64>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a transaction and revert its effect.
    Delete {
        id: i64,
    },
    /// List and search transactions.
    List {
        /// Only this account (either side of transfers)
        #[arg(long)]
        account: Option<i64>,
        /// Month: YYYY-MM
        #[arg(long, value_parser = parse_month)]
        month: Option<YearMonth>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from")]
        from_date: Option<NaiveDate>,
        #[arg(long = "to")]
        to_date: Option<NaiveDate>,
        #[arg(long)]
        kind: Option<TransactionKind>,
        #[arg(long)]
        category: Option<i64>,
        /// Text to look for in notes
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_parser = parse_cents)]
        min: Option<Cents>,
        #[arg(long, value_parser = parse_cents)]
        max: Option<Cents>,
        /// date, date-asc, amount, amount-asc
        #[arg(long, default_value = "date")]
        sort: SortOrder,
    },
}

#[derive(Subcommand)]
pub enum RecurringCommands {
    /// Add a recurring rule.
    Add {
        name: String,
        #[arg(long)]
        account: i64,
        #[arg(long, value_parser = parse_cents)]
        amount: Cents,
        #[arg(long, default_value = "expense")]
        kind: TransactionKind,
        /// daily, weekly, biweekly, monthly, quarterly, yearly
        #[arg(long, default_value = "monthly")]
        frequency: Frequency,
        /// First occurrence, YYYY-MM-DD (default: today)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day the rule may fire
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        to: Option<i64>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// List recurring rules.
    List,
    /// Pause a rule.
    Pause {
        id: i64,
    },
    /// Resume a paused rule.
    Resume {
        id: i64,
    },
    /// Delete a rule. Transactions it already created are kept.
    Delete {
        id: i64,
    },
    /// Materialize every due rule.
    Run {
        /// Run as of this date (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Add a budget for an expense category, or for all expenses.
    Set {
        #[arg(long, value_parser = parse_cents)]
        amount: Cents,
        /// Expense category id (omit for an overall budget)
        #[arg(long)]
        category: Option<i64>,
        /// monthly or yearly
        #[arg(long, default_value = "monthly")]
        period: BudgetPeriod,
        /// First day of the period (default: start of the current month or year)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Warn once this share of the budget is spent
        #[arg(long, default_value_t = 80)]
        alert: u8,
    },
    /// Show budgets in effect today with their spending.
    Status {
        /// Check as of this date (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List every budget.
    List,
    /// Stop tracking a budget.
    Deactivate {
        id: i64,
    },
    /// Delete a budget.
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Income, expenses and net for a period.
    Summary {
        /// Month: YYYY-MM
        #[arg(long, value_parser = parse_month)]
        month: Option<YearMonth>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from")]
        from_date: Option<NaiveDate>,
        #[arg(long = "to")]
        to_date: Option<NaiveDate>,
    },
    /// Totals per category.
    Categories {
        #[arg(long, default_value = "expense")]
        kind: CategoryKind,
        /// Month: YYYY-MM
        #[arg(long, value_parser = parse_month)]
        month: Option<YearMonth>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Month-by-month cash flow.
    Cashflow {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Account balances and net worth.
    Balances,
}
