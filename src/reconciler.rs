use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};

use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::models::{Cents, NewTransaction};

pub const ADJUSTMENT_NOTE: &str = "Balance adjustment (reconciliation)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub account_id: i64,
    /// Balance the ledger held before reconciling.
    pub stored: Cents,
    pub observed: Cents,
    /// `observed - stored`; positive when the ledger is short.
    pub discrepancy: Cents,
    pub is_reconciled: bool,
    pub adjustment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub id: i64,
    pub observed: Cents,
    pub stored: Cents,
    pub is_reconciled: bool,
    pub adjustment_id: Option<i64>,
    pub reconciled_at: NaiveDateTime,
}

/// Compares an observed balance (a statement, or the balance quoted in a bank
/// message) with the ledger. With `apply_on`, a difference is booked as an
/// income or expense adjustment dated that day.
pub fn reconcile(
    ledger: &Ledger,
    account_id: i64,
    observed: Cents,
    apply_on: Option<NaiveDate>,
) -> Result<ReconcileResult> {
    let stored = ledger.account(account_id)?.balance;
    let discrepancy = observed - stored;
    let mut result = ReconcileResult {
        account_id,
        stored,
        observed,
        discrepancy,
        is_reconciled: discrepancy == 0,
        adjustment_id: None,
    };

    match apply_on {
        Some(date) if discrepancy != 0 => {
            let adjustment = if discrepancy > 0 {
                NewTransaction::income(account_id, discrepancy, date)
            } else {
                NewTransaction::expense(account_id, -discrepancy, date)
            }
            .with_note(ADJUSTMENT_NOTE);

            let id = ledger.insert_transaction_then(&adjustment, |tx, id| {
                let balance: Cents = tx.query_row(
                    "SELECT balance FROM accounts WHERE id = ?1",
                    [account_id],
                    |row| row.get(0),
                )?;
                if balance != observed {
                    return Err(LedgerError::validation(
                        "balance",
                        "account changed while reconciling; run it again",
                    ));
                }
                record(tx, account_id, observed, stored, true, Some(id))
            })?;
            result.adjustment_id = Some(id);
            result.is_reconciled = true;
        }
        _ => {
            let is_reconciled = result.is_reconciled;
            ledger.write("record reconciliation", |tx| {
                record(tx, account_id, observed, stored, is_reconciled, None)
            })?;
        }
    }
    Ok(result)
}

fn record(
    conn: &Connection,
    account_id: i64,
    observed: Cents,
    stored: Cents,
    is_reconciled: bool,
    adjustment_id: Option<i64>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO reconciliations (account_id, observed_balance, stored_balance, is_reconciled, adjustment_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![account_id, observed, stored, is_reconciled, adjustment_id],
    )?;
    Ok(())
}

/// Past reconciliations of an account, newest first.
pub fn history(ledger: &Ledger, account_id: i64) -> Result<Vec<Reconciliation>> {
    let conn = ledger.connect()?;
    let mut stmt = conn.prepare(
        "SELECT id, observed_balance, stored_balance, is_reconciled, adjustment_id, reconciled_at
         FROM reconciliations WHERE account_id = ?1
         ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([account_id], |row| {
        Ok(Reconciliation {
            id: row.get(0)?,
            observed: row.get(1)?,
            stored: row.get(2)?,
            is_reconciled: row.get(3)?,
            adjustment_id: row.get(4)?,
            reconciled_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreOptions;
    use crate::models::{AccountKind, NewAccount, TransactionKind};

    fn test_ledger() -> (tempfile::TempDir, Ledger, i64) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("test.db"), StoreOptions::default()).unwrap();
        let acct = ledger
            .create_account(&NewAccount::new("Test Checking", AccountKind::Bank).with_opening_balance(100_000))
            .unwrap();
        (dir, ledger, acct)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    #[test]
    fn test_matching_balance() {
        let (_dir, ledger, acct) = test_ledger();
        let result = reconcile(&ledger, acct, 100_000, None).unwrap();
        assert!(result.is_reconciled);
        assert_eq!(result.discrepancy, 0);
        assert_eq!(result.adjustment_id, None);
    }

    #[test]
    fn test_with_discrepancy() {
        let (_dir, ledger, acct) = test_ledger();
        let result = reconcile(&ledger, acct, 110_000, None).unwrap();
        assert!(!result.is_reconciled);
        assert_eq!(result.discrepancy, 10_000);
        assert_eq!(ledger.account(acct).unwrap().balance, 100_000);
    }

    #[test]
    fn test_apply_books_income_adjustment() {
        let (_dir, ledger, acct) = test_ledger();
        let result = reconcile(&ledger, acct, 112_345, Some(day())).unwrap();
        assert!(result.is_reconciled);
        let adjustment = ledger.transaction(result.adjustment_id.unwrap()).unwrap();
        assert_eq!(adjustment.kind, TransactionKind::Income);
        assert_eq!(adjustment.amount, 12_345);
        assert_eq!(adjustment.note, ADJUSTMENT_NOTE);
        assert_eq!(ledger.account(acct).unwrap().balance, 112_345);
        assert!(ledger.audit_balances().unwrap().is_empty());
    }

    #[test]
    fn test_apply_books_expense_adjustment() {
        let (_dir, ledger, acct) = test_ledger();
        let result = reconcile(&ledger, acct, 99_000, Some(day())).unwrap();
        let adjustment = ledger.transaction(result.adjustment_id.unwrap()).unwrap();
        assert_eq!(adjustment.kind, TransactionKind::Expense);
        assert_eq!(adjustment.amount, 1_000);
        assert_eq!(reconcile(&ledger, acct, 99_000, None).unwrap().discrepancy, 0);
    }

    #[test]
    fn test_stores_history() {
        let (_dir, ledger, acct) = test_ledger();
        reconcile(&ledger, acct, 100_000, None).unwrap();
        reconcile(&ledger, acct, 90_000, Some(day())).unwrap();
        let records = history(&ledger, acct).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].adjustment_id.is_some());
        assert_eq!(records[0].stored, 100_000);
        assert_eq!(records[0].observed, 90_000);
        assert!(records[1].is_reconciled);
    }

    #[test]
    fn test_unknown_account() {
        let (_dir, ledger, _acct) = test_ledger();
        assert!(matches!(
            reconcile(&ledger, 404, 0, None),
            Err(LedgerError::AccountNotFound(404))
        ));
    }
}
