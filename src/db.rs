use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{LedgerError, Result};
use crate::models::{Account, Budget, Category, RecurringRule, Transaction};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    opening_balance INTEGER NOT NULL DEFAULT 0,
    balance INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    color TEXT NOT NULL DEFAULT '#C9CBCF',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    category_id INTEGER,
    amount INTEGER NOT NULL CHECK (amount > 0),
    kind TEXT NOT NULL,
    date TEXT NOT NULL,
    to_account_id INTEGER,
    note TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    modified_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (to_account_id) REFERENCES accounts(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_to_account ON transactions(to_account_id);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

CREATE TABLE IF NOT EXISTS recurring_rules (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    category_id INTEGER,
    amount INTEGER NOT NULL CHECK (amount > 0),
    kind TEXT NOT NULL,
    frequency TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    next_occurrence TEXT NOT NULL,
    last_executed TEXT,
    to_account_id INTEGER,
    note TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    modified_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (to_account_id) REFERENCES accounts(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_rules_due ON recurring_rules(is_active, next_occurrence);

CREATE TABLE IF NOT EXISTS reconciliations (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    observed_balance INTEGER NOT NULL,
    stored_balance INTEGER NOT NULL,
    is_reconciled INTEGER NOT NULL DEFAULT 0,
    adjustment_id INTEGER,
    reconciled_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    category_id INTEGER,
    amount INTEGER NOT NULL CHECK (amount > 0),
    period TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    alert_percentage INTEGER NOT NULL DEFAULT 80,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
";

// (name, kind, color)
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    // Expense
    ("Food & Dining", "expense", "#FF6384"),
    ("Shopping", "expense", "#36A2EB"),
    ("Transport", "expense", "#FFCE56"),
    ("Entertainment", "expense", "#4BC0C0"),
    ("Bills & Utilities", "expense", "#9966FF"),
    ("Healthcare", "expense", "#FF9F40"),
    ("Investment", "expense", "#FF6384"),
    ("Others", "expense", "#C9CBCF"),
    // Income
    ("Salary", "income", "#4CAF50"),
    ("Reimbursement", "income", "#8BC34A"),
    ("Refund", "income", "#CDDC39"),
    ("Interest", "income", "#00BCD4"),
];

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upper bound on waiting for the SQLite write lock or an account lock.
    pub timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Handle to the on-disk ledger. Cheap to clone; every operation opens its
/// own connection so the handle can be shared across threads.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    options: StoreOptions,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = get_connection(path, options.timeout)?;
        init_db(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            options,
        })
    }

    pub fn connect(&self) -> Result<Connection> {
        get_connection(&self.path, self.options.timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }
}

pub fn get_connection(db_path: &Path, timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for cat in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, kind, is_default, color) VALUES (?1, ?2, 1, ?3)",
                rusqlite::params![cat.0, cat.1, cat.2],
            )?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, name, kind, opening_balance, balance, is_active, created_at";

pub(crate) const CATEGORY_COLUMNS: &str = "id, name, kind, is_default, color, created_at";

pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, account_id, category_id, amount, kind, date, to_account_id, note, created_at, modified_at";

pub(crate) const RULE_COLUMNS: &str = "id, name, account_id, category_id, amount, kind, frequency, \
     start_date, end_date, next_occurrence, last_executed, to_account_id, note, is_active";

pub(crate) const BUDGET_COLUMNS: &str =
    "id, category_id, amount, period, start_date, end_date, alert_percentage, is_active, created_at";

pub(crate) fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        opening_balance: row.get(3)?,
        balance: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        is_default: row.get(3)?,
        color: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        category_id: row.get(2)?,
        amount: row.get(3)?,
        kind: row.get(4)?,
        date: row.get(5)?,
        to_account_id: row.get(6)?,
        note: row.get(7)?,
        created_at: row.get(8)?,
        modified_at: row.get(9)?,
    })
}

pub(crate) fn rule_from_row(row: &Row) -> rusqlite::Result<RecurringRule> {
    Ok(RecurringRule {
        id: row.get(0)?,
        name: row.get(1)?,
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        amount: row.get(4)?,
        kind: row.get(5)?,
        frequency: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        next_occurrence: row.get(9)?,
        last_executed: row.get(10)?,
        to_account_id: row.get(11)?,
        note: row.get(12)?,
        is_active: row.get(13)?,
    })
}

pub(crate) fn budget_from_row(row: &Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        category_id: row.get(1)?,
        amount: row.get(2)?,
        period: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        alert_percentage: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub(crate) fn fetch_account(conn: &Connection, id: i64) -> Result<Option<Account>> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], account_from_row).optional()?)
}

pub(crate) fn fetch_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], category_from_row).optional()?)
}

pub(crate) fn fetch_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], transaction_from_row).optional()?)
}

pub(crate) fn fetch_rule(conn: &Connection, id: i64) -> Result<Option<RecurringRule>> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM recurring_rules WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], rule_from_row).optional()?)
}

pub(crate) fn fetch_budget(conn: &Connection, id: i64) -> Result<Option<Budget>> {
    let sql = format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], budget_from_row).optional()?)
}

pub(crate) fn require_account(conn: &Connection, id: i64) -> Result<Account> {
    fetch_account(conn, id)?.ok_or(LedgerError::AccountNotFound(id))
}

pub(crate) fn require_category(conn: &Connection, id: i64) -> Result<Category> {
    fetch_category(conn, id)?.ok_or(LedgerError::CategoryNotFound(id))
}
