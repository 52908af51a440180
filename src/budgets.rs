use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use crate::db::{budget_from_row, fetch_budget, require_category, BUDGET_COLUMNS};
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::models::{Budget, CategoryKind, Cents, NewBudget};

/// A budget with what has been spent against it so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    /// `None` for an overall budget.
    pub category: Option<String>,
    pub spent: Cents,
    pub remaining: Cents,
    pub percent_used: f64,
}

impl BudgetStatus {
    pub fn is_over(&self) -> bool {
        self.spent > self.budget.amount
    }

    pub fn should_alert(&self) -> bool {
        self.percent_used >= f64::from(self.budget.alert_percentage)
    }
}

pub fn create_budget(ledger: &Ledger, new: &NewBudget) -> Result<i64> {
    if new.amount <= 0 {
        return Err(LedgerError::validation("amount", "must be greater than zero"));
    }
    if !(1..=100).contains(&new.alert_percentage) {
        return Err(LedgerError::validation("alert_percentage", "must be between 1 and 100"));
    }
    let end = new
        .period
        .end_from(new.start_date)
        .ok_or_else(|| LedgerError::validation("start_date", "period ends out of range"))?;

    let id = ledger.write("create budget", |tx| {
        if let Some(category_id) = new.category_id {
            let category = require_category(tx, category_id)?;
            if category.kind != CategoryKind::Expense {
                return Err(LedgerError::validation(
                    "category_id",
                    format!("'{}' is not an expense category", category.name),
                ));
            }
        }
        tx.execute(
            "INSERT INTO budgets (category_id, amount, period, start_date, end_date, alert_percentage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![new.category_id, new.amount, new.period, new.start_date, end, new.alert_percentage],
        )?;
        Ok(tx.last_insert_rowid())
    })?;
    debug!(id, amount = new.amount, period = %new.period, "created budget");
    Ok(id)
}

pub fn set_budget_active(ledger: &Ledger, id: i64, active: bool) -> Result<()> {
    let changed = ledger.write("update budget", |tx| {
        Ok(tx.execute("UPDATE budgets SET is_active = ?1 WHERE id = ?2", params![active, id])?)
    })?;
    if changed == 0 {
        return Err(LedgerError::BudgetNotFound(id));
    }
    Ok(())
}

pub fn delete_budget(ledger: &Ledger, id: i64) -> Result<()> {
    let changed = ledger.write("delete budget", |tx| {
        Ok(tx.execute("DELETE FROM budgets WHERE id = ?1", [id])?)
    })?;
    if changed == 0 {
        return Err(LedgerError::BudgetNotFound(id));
    }
    Ok(())
}

pub fn budget(ledger: &Ledger, id: i64) -> Result<Budget> {
    let conn = ledger.connect()?;
    fetch_budget(&conn, id)?.ok_or(LedgerError::BudgetNotFound(id))
}

/// Every budget, active ones first.
pub fn budgets(ledger: &Ledger) -> Result<Vec<Budget>> {
    let conn = ledger.connect()?;
    let sql = format!("SELECT {BUDGET_COLUMNS} FROM budgets ORDER BY is_active DESC, start_date DESC, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], budget_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Expenses booked inside the budget's period, in its category (or in any
/// category for an overall budget).
pub fn budget_status(conn: &Connection, budget: &Budget) -> Result<BudgetStatus> {
    let spent: Cents = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions
         WHERE kind = 'expense' AND date BETWEEN ?1 AND ?2
           AND (?3 IS NULL OR category_id = ?3)",
        params![budget.start_date, budget.end_date, budget.category_id],
        |row| row.get(0),
    )?;
    let category = match budget.category_id {
        Some(id) => Some(require_category(conn, id)?.name),
        None => None,
    };
    Ok(BudgetStatus {
        budget: budget.clone(),
        category,
        spent,
        remaining: budget.amount - spent,
        percent_used: spent as f64 * 100.0 / budget.amount as f64,
    })
}

/// Active budgets whose period contains `today`, with their spending.
pub fn current_budgets(ledger: &Ledger, today: NaiveDate) -> Result<Vec<BudgetStatus>> {
    let conn = ledger.connect()?;
    let sql = format!(
        "SELECT {BUDGET_COLUMNS} FROM budgets
         WHERE is_active = 1 AND start_date <= ?1 AND end_date >= ?1
         ORDER BY category_id IS NOT NULL, id"
    );
    let current = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([today], budget_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };
    current.iter().map(|b| budget_status(&conn, b)).collect()
}
