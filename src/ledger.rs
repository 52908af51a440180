use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, warn};

use crate::db::{
    self, account_from_row, category_from_row, fetch_transaction, require_account,
    require_category, Store, StoreOptions, ACCOUNT_COLUMNS, CATEGORY_COLUMNS,
};
use crate::effect::{effect, net_deltas, touched_accounts, validate_movement, validate_note, Movement};
use crate::error::{LedgerError, Result};
use crate::locks::{AccountLocks, HeldAccounts};
use crate::models::{
    Account, Category, CategoryKind, Cents, NewAccount, NewCategory, NewTransaction, Transaction,
};

/// Rounds of "read accounts, lock, re-check" before giving up on a row whose
/// accounts keep changing underneath us.
const LOCK_ATTEMPTS: usize = 3;

const DEFAULT_COLOR: &str = "#C9CBCF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDrift {
    pub account_id: i64,
    pub name: String,
    pub stored: Cents,
    pub expected: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountRemoval {
    pub transactions: usize,
    pub rules: usize,
}

/// The only writer of account balances. Every mutation runs as one IMMEDIATE
/// SQLite transaction while holding the in-process locks of the accounts it
/// touches.
#[derive(Debug)]
pub struct Ledger {
    store: Store,
    locks: AccountLocks,
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
        }
    }

    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        Ok(Self::new(Store::open(path, options)?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn connect(&self) -> Result<Connection> {
        self.store.connect()
    }

    fn hold(&self, operation: &'static str, accounts: &BTreeSet<i64>) -> Result<HeldAccounts> {
        self.locks
            .acquire(accounts, self.store.timeout())
            .ok_or(LedgerError::StoreTimeout { operation })
    }

    /// Runs `body` inside one IMMEDIATE transaction; any error rolls it back.
    pub(crate) fn write<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.store.connect().map_err(|e| e.during(operation))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| LedgerError::write(operation, e))?;
        let value = body(&tx).map_err(|e| e.during(operation))?;
        tx.commit().map_err(|e| LedgerError::write(operation, e))?;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub fn insert_transaction(&self, new: &NewTransaction) -> Result<i64> {
        self.insert_transaction_then(new, |_, _| Ok(()))
    }

    /// Inserts `new` and runs `then` inside the same database transaction, so
    /// both commit or neither does.
    pub(crate) fn insert_transaction_then<F>(&self, new: &NewTransaction, then: F) -> Result<i64>
    where
        F: FnOnce(&rusqlite::Transaction<'_>, i64) -> Result<()>,
    {
        const OP: &str = "insert transaction";
        validate_movement(new)?;
        validate_note(&new.note)?;

        let _held = self.hold(OP, &touched_accounts(new))?;
        let id = self.write(OP, |tx| {
            check_references(tx, new, new.category_id, &BTreeSet::new())?;
            tx.execute(
                "INSERT INTO transactions (account_id, category_id, amount, kind, date, to_account_id, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.account_id,
                    new.category_id,
                    new.amount,
                    new.kind,
                    new.date,
                    new.to_account_id,
                    new.note.trim(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            apply_deltas(tx, &net_deltas(None, Some(new)))?;
            then(tx, id)?;
            Ok(id)
        })?;
        debug!(id, kind = %new.kind, amount = new.amount, account = new.account_id, "inserted transaction");
        Ok(id)
    }

    /// Replaces a stored transaction with `new`. The row as stored is what
    /// gets reverted; `old` only identifies it.
    pub fn update_transaction(&self, old: &Transaction, new: &Transaction) -> Result<()> {
        const OP: &str = "update transaction";
        if old.id != new.id {
            return Err(LedgerError::validation(
                "id",
                "old and new must describe the same transaction",
            ));
        }
        validate_movement(new)?;
        validate_note(&new.note)?;

        for _ in 0..LOCK_ATTEMPTS {
            let current = self.transaction(new.id)?;
            let mut accounts = touched_accounts(&current);
            accounts.extend(touched_accounts(new));
            let _held = self.hold(OP, &accounts)?;

            let updated = self.write(OP, |tx| {
                let stored = fetch_transaction(tx, new.id)?
                    .ok_or(LedgerError::TransactionNotFound(new.id))?;
                let previous = touched_accounts(&stored);
                if !previous.is_subset(&accounts) {
                    return Ok(false);
                }
                if effect(&stored) != effect(old) {
                    warn!(id = new.id, "update received a stale copy; reverting the stored row instead");
                }
                check_references(tx, new, new.category_id, &previous)?;
                tx.execute(
                    "UPDATE transactions
                     SET account_id = ?1, category_id = ?2, amount = ?3, kind = ?4, date = ?5,
                         to_account_id = ?6, note = ?7, modified_at = datetime('now')
                     WHERE id = ?8",
                    params![
                        new.account_id,
                        new.category_id,
                        new.amount,
                        new.kind,
                        new.date,
                        new.to_account_id,
                        new.note.trim(),
                        new.id,
                    ],
                )?;
                apply_deltas(tx, &net_deltas(Some(&stored), Some(new)))?;
                Ok(true)
            })?;

            if updated {
                debug!(id = new.id, "updated transaction");
                return Ok(());
            }
            debug!(id = new.id, "accounts changed while locking; retrying update");
        }
        Err(LedgerError::StoreTimeout { operation: OP })
    }

    /// Removes the transaction and reverts its effect. Returns `false` when the
    /// row was already gone.
    pub fn delete_transaction(&self, transaction: &Transaction) -> Result<bool> {
        const OP: &str = "delete transaction";
        for _ in 0..LOCK_ATTEMPTS {
            let conn = self.store.connect()?;
            let Some(current) = fetch_transaction(&conn, transaction.id)? else {
                return Ok(false);
            };
            drop(conn);
            let accounts = touched_accounts(&current);
            let _held = self.hold(OP, &accounts)?;

            let outcome = self.write(OP, |tx| {
                let Some(stored) = fetch_transaction(tx, transaction.id)? else {
                    return Ok(Some(false));
                };
                if !touched_accounts(&stored).is_subset(&accounts) {
                    return Ok(None);
                }
                tx.execute("DELETE FROM transactions WHERE id = ?1", [stored.id])?;
                apply_deltas(tx, &net_deltas(Some(&stored), None))?;
                Ok(Some(true))
            })?;

            if let Some(deleted) = outcome {
                debug!(id = transaction.id, deleted, "delete transaction");
                return Ok(deleted);
            }
        }
        Err(LedgerError::StoreTimeout { operation: OP })
    }

    pub fn transaction(&self, id: i64) -> Result<Transaction> {
        let conn = self.store.connect()?;
        fetch_transaction(&conn, id)?.ok_or(LedgerError::TransactionNotFound(id))
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub fn create_account(&self, new: &NewAccount) -> Result<i64> {
        let name = new.name.trim();
        let len = name.chars().count();
        if !(2..=50).contains(&len) {
            return Err(LedgerError::validation("name", "account name must be 2 to 50 characters"));
        }
        let id = self.write("create account", |tx| {
            tx.execute(
                "INSERT INTO accounts (name, kind, opening_balance, balance) VALUES (?1, ?2, ?3, ?3)",
                params![name, new.kind, new.opening_balance],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!(id, account = name, "created account");
        Ok(id)
    }

    pub fn set_account_active(&self, id: i64, active: bool) -> Result<()> {
        let changed = self.write("update account", |tx| {
            Ok(tx.execute(
                "UPDATE accounts SET is_active = ?1 WHERE id = ?2",
                params![active, id],
            )?)
        })?;
        if changed == 0 {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(())
    }

    pub fn deactivate_account(&self, id: i64) -> Result<()> {
        self.set_account_active(id, false)
    }

    /// Deletes the account together with every transaction and recurring rule
    /// referencing it. Transfers touching it are unwound on the other side.
    pub fn delete_account(&self, id: i64) -> Result<AccountRemoval> {
        const OP: &str = "delete account";
        for _ in 0..LOCK_ATTEMPTS {
            let conn = self.store.connect()?;
            require_account(&conn, id)?;
            let accounts = linked_accounts(&conn, id)?;
            drop(conn);
            let _held = self.hold(OP, &accounts)?;

            let outcome = self.write(OP, |tx| {
                require_account(tx, id)?;
                if !linked_accounts(tx, id)?.is_subset(&accounts) {
                    return Ok(None);
                }

                let mut net: BTreeMap<i64, Cents> = BTreeMap::new();
                for touching in transactions_touching(tx, id)? {
                    for (account, delta) in net_deltas(Some(&touching), None) {
                        if account != id {
                            *net.entry(account).or_insert(0) += delta;
                        }
                    }
                }
                net.retain(|_, delta| *delta != 0);
                apply_deltas(tx, &net)?;

                let transactions = tx.execute(
                    "DELETE FROM transactions WHERE account_id = ?1 OR to_account_id = ?1",
                    [id],
                )?;
                let rules = tx.execute(
                    "DELETE FROM recurring_rules WHERE account_id = ?1 OR to_account_id = ?1",
                    [id],
                )?;
                tx.execute("DELETE FROM reconciliations WHERE account_id = ?1", [id])?;
                tx.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
                Ok(Some(AccountRemoval { transactions, rules }))
            })?;

            if let Some(removal) = outcome {
                debug!(id, transactions = removal.transactions, rules = removal.rules, "deleted account");
                return Ok(removal);
            }
        }
        Err(LedgerError::StoreTimeout { operation: OP })
    }

    pub fn account(&self, id: i64) -> Result<Account> {
        let conn = self.store.connect()?;
        require_account(&conn, id)
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        let conn = self.store.connect()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], account_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Recomputes each balance from the transaction log and returns every
    /// account whose stored balance disagrees.
    pub fn audit_balances(&self) -> Result<Vec<BalanceDrift>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.balance,
                    a.opening_balance
                    + COALESCE((SELECT SUM(CASE t.kind WHEN 'income' THEN t.amount ELSE -t.amount END)
                                FROM transactions t WHERE t.account_id = a.id), 0)
                    + COALESCE((SELECT SUM(t.amount) FROM transactions t
                                WHERE t.kind = 'transfer' AND t.to_account_id = a.id), 0)
             FROM accounts a
             ORDER BY a.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BalanceDrift {
                account_id: row.get(0)?,
                name: row.get(1)?,
                stored: row.get(2)?,
                expected: row.get(3)?,
            })
        })?;
        let mut drifted = Vec::new();
        for row in rows {
            let row = row?;
            if row.stored != row.expected {
                drifted.push(row);
            }
        }
        Ok(drifted)
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub fn create_category(&self, new: &NewCategory) -> Result<i64> {
        let name = new.name.trim();
        let len = name.chars().count();
        if !(2..=30).contains(&len) {
            return Err(LedgerError::validation("name", "category name must be 2 to 30 characters"));
        }
        let color = match new.color.trim() {
            "" => DEFAULT_COLOR,
            color => color,
        };
        self.write("create category", |tx| {
            tx.execute(
                "INSERT INTO categories (name, kind, is_default, color) VALUES (?1, ?2, 0, ?3)",
                params![name, new.kind, color],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Deletes a user category, clearing it from transactions and rules and
    /// dropping its budgets.
    /// Seeded default categories cannot be deleted.
    pub fn delete_category(&self, id: i64) -> Result<()> {
        self.write("delete category", |tx| {
            let category = require_category(tx, id)?;
            if category.is_default {
                return Err(LedgerError::validation(
                    "category_id",
                    format!("'{}' is a default category and cannot be deleted", category.name),
                ));
            }
            tx.execute("UPDATE transactions SET category_id = NULL WHERE category_id = ?1", [id])?;
            tx.execute("UPDATE recurring_rules SET category_id = NULL WHERE category_id = ?1", [id])?;
            tx.execute("DELETE FROM budgets WHERE category_id = ?1", [id])?;
            tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn category(&self, id: i64) -> Result<Category> {
        let conn = self.store.connect()?;
        require_category(&conn, id)
    }

    pub fn categories(&self, kind: Option<CategoryKind>) -> Result<Vec<Category>> {
        let conn = self.store.connect()?;
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories
             WHERE ?1 IS NULL OR kind = ?1
             ORDER BY kind, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([kind], category_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

// ---------------------------------------------------------------------------
// Write-unit helpers
// ---------------------------------------------------------------------------

/// Confirms every account and the category exist. Accounts the movement
/// newly lands on must be active; `already_on` lists the accounts it
/// touched before this write.
pub(crate) fn check_references(
    conn: &Connection,
    movement: &dyn Movement,
    category_id: Option<i64>,
    already_on: &BTreeSet<i64>,
) -> Result<()> {
    for account_id in touched_accounts(movement) {
        let account = require_account(conn, account_id)?;
        if !account.is_active && !already_on.contains(&account_id) {
            let field = if Some(account_id) == movement.to_account_id() {
                "to_account_id"
            } else {
                "account_id"
            };
            return Err(LedgerError::validation(
                field,
                format!("account '{}' is inactive", account.name),
            ));
        }
    }
    if let Some(id) = category_id {
        require_category(conn, id)?;
    }
    Ok(())
}

fn apply_deltas(conn: &Connection, deltas: &BTreeMap<i64, Cents>) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE accounts SET balance = balance + ?1 WHERE id = ?2")?;
    for (&account, &delta) in deltas {
        if stmt.execute(params![delta, account])? != 1 {
            return Err(LedgerError::AccountNotFound(account));
        }
    }
    Ok(())
}

/// The account plus every account it shares a transfer with.
fn linked_accounts(conn: &Connection, id: i64) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare(
        "SELECT account_id FROM transactions WHERE to_account_id = ?1
         UNION
         SELECT to_account_id FROM transactions WHERE account_id = ?1 AND to_account_id IS NOT NULL",
    )?;
    let mut accounts = BTreeSet::from([id]);
    for row in stmt.query_map([id], |row| row.get::<_, i64>(0))? {
        accounts.insert(row?);
    }
    Ok(accounts)
}

fn transactions_touching(conn: &Connection, id: i64) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE account_id = ?1 OR to_account_id = ?1",
        db::TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([id], db::transaction_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountKind, TransactionKind};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn test_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("test.db"), StoreOptions::default()).unwrap();
        (dir, ledger)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn open_account(ledger: &Ledger, name: &str, opening: Cents) -> i64 {
        ledger
            .create_account(&NewAccount::new(name, AccountKind::Bank).with_opening_balance(opening))
            .unwrap()
    }

    fn balance(ledger: &Ledger, id: i64) -> Cents {
        ledger.account(id).unwrap().balance
    }

    fn transaction_count(ledger: &Ledger) -> i64 {
        ledger
            .connect()
            .unwrap()
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_income_and_expense() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Savings", 10_000);
        ledger.insert_transaction(&NewTransaction::income(acc, 2_500, day(1))).unwrap();
        ledger.insert_transaction(&NewTransaction::expense(acc, 700, day(2))).unwrap();
        assert_eq!(balance(&ledger, acc), 11_800);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_transfer_insert_and_delete_symmetry() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 50_000);
        let b = open_account(&ledger, "Wallet", 1_000);
        let id = ledger
            .insert_transaction(&NewTransaction::transfer(a, b, 20_000, day(3)))
            .unwrap();
        assert_eq!(balance(&ledger, a), 30_000);
        assert_eq!(balance(&ledger, b), 21_000);

        let stored = ledger.transaction(id).unwrap();
        assert!(ledger.delete_transaction(&stored).unwrap());
        assert_eq!(balance(&ledger, a), 50_000);
        assert_eq!(balance(&ledger, b), 1_000);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Cash", 0);
        let id = ledger.insert_transaction(&NewTransaction::income(acc, 900, day(1))).unwrap();
        let stored = ledger.transaction(id).unwrap();
        assert!(ledger.delete_transaction(&stored).unwrap());
        assert!(!ledger.delete_transaction(&stored).unwrap());
        assert_eq!(balance(&ledger, acc), 0);
    }

    #[test]
    fn test_insert_unknown_account_leaves_nothing_behind() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 5_000);
        let err = ledger
            .insert_transaction(&NewTransaction::transfer(a, 999, 1_000, day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(999)));
        assert_eq!(balance(&ledger, a), 5_000);
        assert_eq!(transaction_count(&ledger), 0);
    }

    #[test]
    fn test_insert_unknown_category_rejected() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 0);
        let err = ledger
            .insert_transaction(&NewTransaction::expense(a, 100, day(1)).with_category(4242))
            .unwrap_err();
        assert!(matches!(err, LedgerError::CategoryNotFound(4242)));
        assert_eq!(balance(&ledger, a), 0);
    }

    #[test]
    fn test_validation_runs_before_storage() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 0);
        let err = ledger
            .insert_transaction(&NewTransaction::expense(a, 0, day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "amount", .. }));
        let err = ledger
            .insert_transaction(&NewTransaction::transfer(a, a, 10, day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "to_account_id", .. }));
        let err = ledger
            .insert_transaction(&NewTransaction::expense(a, 10, day(1)).with_note("n".repeat(201)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "note", .. }));
        assert_eq!(transaction_count(&ledger), 0);
    }

    #[test]
    fn test_update_kind_change_on_same_account() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Checking", 1_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(acc, 100, day(1))).unwrap();
        assert_eq!(balance(&ledger, acc), 900);

        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.kind = crate::models::TransactionKind::Income;
        new.amount = 150;
        ledger.update_transaction(&old, &new).unwrap();
        assert_eq!(balance(&ledger, acc), 1_150);
        assert_eq!(ledger.transaction(id).unwrap().amount, 150);
    }

    #[test]
    fn test_update_reassigns_between_accounts() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 1_000);
        let b = open_account(&ledger, "Card", 1_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(a, 100, day(1))).unwrap();

        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.account_id = b;
        ledger.update_transaction(&old, &new).unwrap();
        assert_eq!(balance(&ledger, a), 1_000);
        assert_eq!(balance(&ledger, b), 900);
    }

    #[test]
    fn test_update_transfer_to_expense_on_third_account() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 1_000);
        let b = open_account(&ledger, "Savings", 0);
        let c = open_account(&ledger, "Cash", 500);
        let id = ledger
            .insert_transaction(&NewTransaction::transfer(a, b, 300, day(1)))
            .unwrap();

        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.kind = crate::models::TransactionKind::Expense;
        new.account_id = c;
        new.to_account_id = None;
        new.amount = 50;
        ledger.update_transaction(&old, &new).unwrap();
        assert_eq!(balance(&ledger, a), 1_000);
        assert_eq!(balance(&ledger, b), 0);
        assert_eq!(balance(&ledger, c), 450);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_update_uses_stored_row_not_stale_copy() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Checking", 1_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(acc, 100, day(1))).unwrap();
        let stale = ledger.transaction(id).unwrap();

        let mut first = stale.clone();
        first.amount = 200;
        ledger.update_transaction(&stale, &first).unwrap();
        assert_eq!(balance(&ledger, acc), 800);

        // second editor still holds the 100 version
        let mut second = stale.clone();
        second.amount = 300;
        ledger.update_transaction(&stale, &second).unwrap();
        assert_eq!(balance(&ledger, acc), 700);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_update_rejects_mismatched_ids() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Checking", 0);
        let id = ledger.insert_transaction(&NewTransaction::income(acc, 100, day(1))).unwrap();
        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.id += 1;
        let err = ledger.update_transaction(&old, &new).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "id", .. }));
    }

    #[test]
    fn test_update_missing_transaction() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Checking", 0);
        let id = ledger.insert_transaction(&NewTransaction::income(acc, 100, day(1))).unwrap();
        let old = ledger.transaction(id).unwrap();
        ledger.delete_transaction(&old).unwrap();
        let err = ledger.update_transaction(&old, &old).unwrap_err();
        assert!(matches!(err, LedgerError::TransactionNotFound(_)));
        assert_eq!(balance(&ledger, acc), 0);
    }

    #[test]
    fn test_inactive_account_rejects_new_effects() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Old Card", 1_000);
        let b = open_account(&ledger, "Checking", 1_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(a, 100, day(1))).unwrap();
        ledger.deactivate_account(a).unwrap();

        let err = ledger
            .insert_transaction(&NewTransaction::expense(a, 100, day(2)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "account_id", .. }));
        let err = ledger
            .insert_transaction(&NewTransaction::transfer(b, a, 100, day(2)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "to_account_id", .. }));

        // existing rows can still be edited in place and moved away
        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.amount = 50;
        ledger.update_transaction(&old, &new).unwrap();
        assert_eq!(balance(&ledger, a), 950);
        let old = ledger.transaction(id).unwrap();
        let mut moved = old.clone();
        moved.account_id = b;
        ledger.update_transaction(&old, &moved).unwrap();
        assert_eq!(balance(&ledger, a), 1_000);
        assert_eq!(balance(&ledger, b), 950);
    }

    #[test]
    fn test_delete_account_cascades_and_restores_counterpart() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 10_000);
        let b = open_account(&ledger, "Savings", 0);
        ledger.insert_transaction(&NewTransaction::transfer(a, b, 4_000, day(1))).unwrap();
        ledger.insert_transaction(&NewTransaction::transfer(b, a, 1_000, day(2))).unwrap();
        ledger.insert_transaction(&NewTransaction::expense(b, 500, day(3))).unwrap();
        let kept = ledger.insert_transaction(&NewTransaction::income(a, 200, day(4))).unwrap();
        assert_eq!(balance(&ledger, a), 7_200);

        let removal = ledger.delete_account(b).unwrap();
        assert_eq!(removal.transactions, 3);
        assert_eq!(balance(&ledger, a), 10_200);
        assert!(matches!(ledger.account(b), Err(LedgerError::AccountNotFound(_))));
        assert!(ledger.transaction(kept).is_ok());
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_account() {
        let (_dir, ledger) = test_ledger();
        assert!(matches!(ledger.delete_account(77), Err(LedgerError::AccountNotFound(77))));
    }

    #[test]
    fn test_account_name_length() {
        let (_dir, ledger) = test_ledger();
        let err = ledger.create_account(&NewAccount::new("A", AccountKind::Cash)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "name", .. }));
        assert!(ledger.create_account(&NewAccount::new(" HDFC 1234 ", AccountKind::Bank)).is_ok());
        assert_eq!(ledger.accounts().unwrap()[0].name, "HDFC 1234");
    }

    #[test]
    fn test_default_category_cannot_be_deleted() {
        let (_dir, ledger) = test_ledger();
        let default = &ledger.categories(Some(CategoryKind::Expense)).unwrap()[0];
        let err = ledger.delete_category(default.id).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "category_id", .. }));
    }

    #[test]
    fn test_delete_user_category_clears_references() {
        let (_dir, ledger) = test_ledger();
        let acc = open_account(&ledger, "Checking", 0);
        let cat = ledger
            .create_category(&NewCategory {
                name: "Pets".into(),
                kind: CategoryKind::Expense,
                color: String::new(),
            })
            .unwrap();
        assert_eq!(ledger.category(cat).unwrap().color, DEFAULT_COLOR);
        let id = ledger
            .insert_transaction(&NewTransaction::expense(acc, 300, day(1)).with_category(cat))
            .unwrap();
        ledger.delete_category(cat).unwrap();
        assert_eq!(ledger.transaction(id).unwrap().category_id, None);
        assert_eq!(balance(&ledger, acc), -300);
    }

    #[test]
    fn test_categories_filtered_by_kind() {
        let (_dir, ledger) = test_ledger();
        let income = ledger.categories(Some(CategoryKind::Income)).unwrap();
        assert_eq!(income.len(), 4);
        assert!(income.iter().all(|c| c.kind == CategoryKind::Income));
        assert_eq!(ledger.categories(None).unwrap().len(), 12);
    }

    #[test]
    fn test_balance_invariant_over_mixed_sequence() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 25_000);
        let b = open_account(&ledger, "Savings", 5_000);
        let c = open_account(&ledger, "Cash", 0);
        let mut ids = Vec::new();
        for i in 1..=12u32 {
            let new = match i % 3 {
                0 => NewTransaction::income(a, i64::from(i) * 100, day(i)),
                1 => NewTransaction::expense(b, i64::from(i) * 10, day(i)),
                _ => NewTransaction::transfer(a, c, i64::from(i) * 50, day(i)),
            };
            ids.push(ledger.insert_transaction(&new).unwrap());
        }
        for id in ids.iter().step_by(4) {
            let old = ledger.transaction(*id).unwrap();
            let mut new = old.clone();
            new.amount += 1;
            ledger.update_transaction(&old, &new).unwrap();
        }
        for id in ids.iter().skip(1).step_by(5) {
            let stored = ledger.transaction(*id).unwrap();
            ledger.delete_transaction(&stored).unwrap();
        }
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writers_keep_balances_exact() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 100_000);
        let b = open_account(&ledger, "Savings", 100_000);
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let ledger = &ledger;
                scope.spawn(move || {
                    for _ in 0..10 {
                        let tx = if worker % 2 == 0 {
                            NewTransaction::transfer(a, b, 100, day(5))
                        } else {
                            NewTransaction::transfer(b, a, 30, day(5))
                        };
                        ledger.insert_transaction(&tx).unwrap();
                        ledger.insert_transaction(&NewTransaction::expense(a, 1, day(5))).unwrap();
                    }
                });
            }
        });
        // workers 0,2 move 2 * 10 * 100 a->b; workers 1,3 move 2 * 10 * 30 b->a
        assert_eq!(balance(&ledger, a), 100_000 - 2_000 + 600 - 40);
        assert_eq!(balance(&ledger, b), 100_000 + 2_000 - 600);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_updates_and_deletes_keep_balances_exact() {
        let (_dir, ledger) = test_ledger();
        let accounts = [
            open_account(&ledger, "Checking", 50_000),
            open_account(&ledger, "Savings", 50_000),
            open_account(&ledger, "Cash", 50_000),
        ];
        let ids: Vec<i64> = (0..20u32)
            .map(|n| {
                let new = NewTransaction::expense(accounts[n as usize % 3], 100 + i64::from(n), day(1 + n));
                ledger.insert_transaction(&new).unwrap()
            })
            .collect();

        std::thread::scope(|scope| {
            for worker in 0..6usize {
                let ledger = &ledger;
                let ids = &ids;
                scope.spawn(move || {
                    for (n, &id) in ids.iter().enumerate() {
                        let Ok(old) = ledger.transaction(id) else {
                            continue;
                        };
                        let mut new = old.clone();
                        new.category_id = None;
                        let result = match (worker + n) % 4 {
                            0 => {
                                new.kind = TransactionKind::Expense;
                                new.to_account_id = None;
                                new.account_id = accounts[(worker + n) % 3];
                                ledger.update_transaction(&old, &new)
                            }
                            1 => {
                                new.kind = TransactionKind::Transfer;
                                new.account_id = accounts[worker % 3];
                                new.to_account_id = Some(accounts[(worker + 1) % 3]);
                                ledger.update_transaction(&old, &new)
                            }
                            3 if n % 2 == 0 => ledger.delete_transaction(&old).map(|_| ()),
                            _ => {
                                new.kind = TransactionKind::Income;
                                new.to_account_id = None;
                                new.amount += 1;
                                ledger.update_transaction(&old, &new)
                            }
                        };
                        match result {
                            Ok(()) | Err(LedgerError::TransactionNotFound(_)) => {}
                            Err(e) if e.is_retryable() => {}
                            Err(e) => panic!("worker {worker} on transaction {id}: {e}"),
                        }
                    }
                });
            }
        });

        // every even row meets a deleting worker; odd rows survive
        assert_eq!(transaction_count(&ledger), 10);
        assert!(ledger.audit_balances().unwrap().is_empty());
        let net: Cents = ledger
            .connect()
            .unwrap()
            .query_row(
                "SELECT COALESCE(SUM(CASE kind WHEN 'income' THEN amount WHEN 'expense' THEN -amount ELSE 0 END), 0)
                 FROM transactions",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let total: Cents = accounts.iter().map(|&id| balance(&ledger, id)).sum();
        assert_eq!(total, 150_000 + net);
    }

    #[test]
    fn test_update_follows_a_row_moved_while_waiting_for_locks() {
        let (_dir, ledger) = test_ledger();
        let a = open_account(&ledger, "Checking", 10_000);
        let b = open_account(&ledger, "Savings", 10_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(a, 1_000, day(1))).unwrap();
        let held = ledger.locks.acquire(&BTreeSet::from([a]), Duration::from_secs(5)).unwrap();

        std::thread::scope(|scope| {
            let ledger = &ledger;
            let worker = scope.spawn(move || {
                let old = ledger.transaction(id).unwrap();
                let mut new = old.clone();
                new.amount = 2_500;
                ledger.update_transaction(&old, &new)
            });
            std::thread::sleep(Duration::from_millis(100));

            // a second process moves the row to b; it does not share our locks
            let mut conn = ledger.connect().unwrap();
            let tx = conn.transaction().unwrap();
            tx.execute("UPDATE transactions SET account_id = ?1 WHERE id = ?2", [b, id]).unwrap();
            tx.execute("UPDATE accounts SET balance = balance + 1000 WHERE id = ?1", [a]).unwrap();
            tx.execute("UPDATE accounts SET balance = balance - 1000 WHERE id = ?1", [b]).unwrap();
            tx.commit().unwrap();
            drop(held);

            worker.join().unwrap().unwrap();
        });

        assert_eq!(ledger.transaction(id).unwrap().amount, 2_500);
        assert_eq!(balance(&ledger, a) + balance(&ledger, b), 20_000 - 2_500);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_lock_timeout_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            timeout: Duration::from_millis(50),
        };
        let ledger = Ledger::open(&dir.path().join("test.db"), options).unwrap();
        let a = open_account(&ledger, "Checking", 10_000);
        let id = ledger.insert_transaction(&NewTransaction::expense(a, 1_000, day(1))).unwrap();
        let old = ledger.transaction(id).unwrap();
        let mut new = old.clone();
        new.amount = 4_000;

        let _held = ledger.locks.acquire(&BTreeSet::from([a]), Duration::from_secs(1)).unwrap();
        let err = ledger.update_transaction(&old, &new).unwrap_err();
        assert!(matches!(err, LedgerError::StoreTimeout { operation: "update transaction" }));
        assert!(err.is_retryable());
        assert!(matches!(
            ledger.delete_transaction(&old),
            Err(LedgerError::StoreTimeout { operation: "delete transaction" })
        ));
        assert!(matches!(
            ledger.insert_transaction(&NewTransaction::income(a, 5, day(2))),
            Err(LedgerError::StoreTimeout { .. })
        ));
        assert_eq!(balance(&ledger, a), 9_000);
        assert_eq!(ledger.transaction(id).unwrap().amount, 1_000);
    }
}
