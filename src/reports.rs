use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use rusqlite::{params, Connection};

use crate::db::{transaction_from_row, TRANSACTION_COLUMNS};
use crate::error::{LedgerError, Result};
use crate::models::{CategoryKind, Cents, Transaction, TransactionKind};

// ---------------------------------------------------------------------------
// Date range helper
// ---------------------------------------------------------------------------

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(LedgerError::validation("from", "start date is after end date"));
        }
        Ok(Self { from, to })
    }

    pub fn month(year: i32, month: u32) -> Result<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| LedgerError::validation("month", format!("{year}-{month:02} is not a month")))?;
        let to = from
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| LedgerError::validation("month", "out of range"))?;
        Ok(Self { from, to })
    }

    pub fn year(year: i32) -> Result<Self> {
        let from = NaiveDate::from_ymd_opt(year, 1, 1);
        let to = NaiveDate::from_ymd_opt(year, 12, 31);
        match (from, to) {
            (Some(from), Some(to)) => Ok(Self { from, to }),
            _ => Err(LedgerError::validation("year", format!("{year} is out of range"))),
        }
    }

    /// Explicit bounds win, then year/month; defaults to the year of `today`.
    pub fn resolve(
        year: Option<i32>,
        month: Option<u32>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        match (from, to) {
            (Some(from), Some(to)) => return Self::new(from, to),
            (Some(_), None) => {
                return Err(LedgerError::validation(
                    "to",
                    "--from requires --to (both date boundaries must be specified)",
                ))
            }
            (None, Some(_)) => {
                return Err(LedgerError::validation(
                    "from",
                    "--to requires --from (both date boundaries must be specified)",
                ))
            }
            (None, None) => {}
        }
        let year = year.unwrap_or_else(|| today.year());
        match month {
            Some(month) => Self::month(year, month),
            None => Self::year(year),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction listings
// ---------------------------------------------------------------------------

/// Every transaction touching the account on either side, newest first.
pub fn transactions_for_account(conn: &Connection, account_id: i64) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE account_id = ?1 OR to_account_id = ?1
         ORDER BY date DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([account_id], transaction_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn transactions_between(
    conn: &Connection,
    range: DateRange,
    kind: Option<TransactionKind>,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR kind = ?3)
         ORDER BY date DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![range.from, range.to, kind], transaction_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    DateDesc,
    DateAsc,
    AmountDesc,
    AmountAsc,
}

impl SortOrder {
    fn order_by(self) -> &'static str {
        match self {
            Self::DateDesc => "date DESC, id DESC",
            Self::DateAsc => "date ASC, id ASC",
            Self::AmountDesc => "amount DESC, date DESC, id DESC",
            Self::AmountAsc => "amount ASC, date DESC, id DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" | "date-desc" => Ok(Self::DateDesc),
            "date-asc" => Ok(Self::DateAsc),
            "amount" | "amount-desc" => Ok(Self::AmountDesc),
            "amount-asc" => Ok(Self::AmountAsc),
            _ => Err("expected one of: date, date-asc, amount, amount-asc".to_string()),
        }
    }
}

/// Search criteria over the transaction log. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Case-insensitive substring of the note.
    pub search: String,
    pub kind: Option<TransactionKind>,
    /// Matches either side of a transfer.
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub range: Option<DateRange>,
    pub min_amount: Option<Cents>,
    pub max_amount: Option<Cents>,
    pub sort: SortOrder,
}

pub fn filter_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
           AND (?3 IS NULL OR kind = ?3)
           AND (?4 IS NULL OR account_id = ?4 OR to_account_id = ?4)
           AND (?5 IS NULL OR category_id = ?5)
           AND (?6 IS NULL OR amount >= ?6) AND (?7 IS NULL OR amount <= ?7)
           AND (?8 = '' OR instr(lower(note), lower(?8)) > 0)
         ORDER BY {}",
        filter.sort.order_by()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            filter.range.map(|r| r.from),
            filter.range.map(|r| r.to),
            filter.kind,
            filter.account_id,
            filter.category_id,
            filter.min_amount,
            filter.max_amount,
            filter.search.trim(),
        ],
        transaction_from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

pub fn total_by_kind(conn: &Connection, kind: TransactionKind, range: DateRange) -> Result<Cents> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE kind = ?1 AND date BETWEEN ?2 AND ?3",
        params![kind, range.from, range.to],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub struct Summary {
    pub income: Cents,
    pub expenses: Cents,
    pub net: Cents,
}

/// Income against expenses; transfers move money between own accounts and are left out.
pub fn summary(conn: &Connection, range: DateRange) -> Result<Summary> {
    let income = total_by_kind(conn, TransactionKind::Income, range)?;
    let expenses = total_by_kind(conn, TransactionKind::Expense, range)?;
    Ok(Summary {
        income,
        expenses,
        net: income - expenses,
    })
}

pub struct CategoryTotal {
    pub name: String,
    pub color: String,
    pub total: Cents,
    pub count: i64,
}

pub fn category_totals(conn: &Connection, kind: CategoryKind, range: DateRange) -> Result<Vec<CategoryTotal>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(c.name, 'Uncategorized'), COALESCE(c.color, '#C9CBCF'),
                SUM(t.amount), COUNT(*)
         FROM transactions t
         LEFT JOIN categories c ON c.id = t.category_id
         WHERE t.kind = ?1 AND t.date BETWEEN ?2 AND ?3
         GROUP BY t.category_id
         ORDER BY 3 DESC",
    )?;
    let rows = stmt.query_map(params![kind.key(), range.from, range.to], |row| {
        Ok(CategoryTotal {
            name: row.get(0)?,
            color: row.get(1)?,
            total: row.get(2)?,
            count: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub struct CashflowMonth {
    pub month: String,
    pub income: Cents,
    pub expenses: Cents,
    pub net: Cents,
}

pub fn monthly_cashflow(conn: &Connection, range: DateRange) -> Result<Vec<CashflowMonth>> {
    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', date) AS month,
                SUM(CASE WHEN kind = 'income' THEN amount ELSE 0 END),
                SUM(CASE WHEN kind = 'expense' THEN amount ELSE 0 END)
         FROM transactions
         WHERE date BETWEEN ?1 AND ?2
         GROUP BY month
         ORDER BY month",
    )?;
    let rows = stmt.query_map(params![range.from, range.to], |row| {
        let income: Cents = row.get(1)?;
        let expenses: Cents = row.get(2)?;
        Ok(CashflowMonth {
            month: row.get(0)?,
            income,
            expenses,
            net: income - expenses,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Sum of the balances of all active accounts.
pub fn net_worth(conn: &Connection) -> Result<Cents> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreOptions;
    use crate::ledger::Ledger;
    use crate::models::{AccountKind, NewAccount, NewTransaction};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn test_db() -> (tempfile::TempDir, Ledger, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("test.db"), StoreOptions::default()).unwrap();
        let checking = ledger
            .create_account(&NewAccount::new("Checking", AccountKind::Bank).with_opening_balance(50_000))
            .unwrap();
        let savings = ledger
            .create_account(&NewAccount::new("Savings", AccountKind::Bank))
            .unwrap();
        let food = ledger.categories(Some(CategoryKind::Expense)).unwrap()[0].id;

        for tx in [
            NewTransaction::income(checking, 300_000, d(2025, 1, 1)),
            NewTransaction::expense(checking, 1_200, d(2025, 1, 5)).with_category(food),
            NewTransaction::expense(checking, 800, d(2025, 1, 20)).with_category(food),
            NewTransaction::expense(checking, 5_000, d(2025, 2, 2)),
            NewTransaction::transfer(checking, savings, 100_000, d(2025, 2, 3)),
            NewTransaction::income(savings, 250, d(2024, 12, 31)),
        ] {
            ledger.insert_transaction(&tx).unwrap();
        }
        (dir, ledger, checking, savings)
    }

    #[test]
    fn test_resolve_date_range() {
        let today = d(2025, 6, 15);
        assert_eq!(
            DateRange::resolve(None, None, None, None, today).unwrap(),
            DateRange { from: d(2025, 1, 1), to: d(2025, 12, 31) }
        );
        assert_eq!(
            DateRange::resolve(Some(2024), Some(2), None, None, today).unwrap(),
            DateRange { from: d(2024, 2, 1), to: d(2024, 2, 29) }
        );
        assert_eq!(
            DateRange::resolve(None, Some(12), None, None, today).unwrap().to,
            d(2025, 12, 31)
        );
        assert!(DateRange::resolve(None, None, Some(d(2025, 1, 1)), None, today).is_err());
        assert!(DateRange::resolve(None, None, Some(d(2025, 2, 1)), Some(d(2025, 1, 1)), today).is_err());
        assert!(DateRange::month(2025, 13).is_err());
    }

    #[test]
    fn test_transactions_for_account_includes_incoming_transfers() {
        let (_dir, ledger, checking, savings) = test_db();
        let conn = ledger.connect().unwrap();
        assert_eq!(transactions_for_account(&conn, checking).unwrap().len(), 5);
        let savings_rows = transactions_for_account(&conn, savings).unwrap();
        assert_eq!(savings_rows.len(), 2);
        assert_eq!(savings_rows[0].kind, TransactionKind::Transfer);
    }

    #[test]
    fn test_transactions_between_filters_kind() {
        let (_dir, ledger, _, _) = test_db();
        let conn = ledger.connect().unwrap();
        let jan = DateRange::month(2025, 1).unwrap();
        assert_eq!(transactions_between(&conn, jan, None).unwrap().len(), 3);
        let expenses = transactions_between(&conn, jan, Some(TransactionKind::Expense)).unwrap();
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].date, d(2025, 1, 20));
    }

    #[test]
    fn test_filter_combines_criteria() {
        let (_dir, ledger, checking, savings) = test_db();
        ledger
            .insert_transaction(&NewTransaction::expense(savings, 450, d(2025, 3, 1)).with_note("Blue Tokai coffee"))
            .unwrap();
        ledger
            .insert_transaction(&NewTransaction::expense(checking, 90, d(2025, 3, 2)).with_note("COFFEE"))
            .unwrap();
        let conn = ledger.connect().unwrap();

        let coffee = TransactionFilter {
            search: "coffee".into(),
            ..Default::default()
        };
        assert_eq!(filter_transactions(&conn, &coffee).unwrap().len(), 2);

        let big_coffee = TransactionFilter {
            min_amount: Some(100),
            ..coffee.clone()
        };
        let rows = filter_transactions(&conn, &big_coffee).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].account_id, savings);

        let on_savings = TransactionFilter {
            account_id: Some(savings),
            sort: SortOrder::DateAsc,
            ..Default::default()
        };
        let rows = filter_transactions(&conn, &on_savings).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, d(2024, 12, 31));

        let jan_by_amount = TransactionFilter {
            range: Some(DateRange::month(2025, 1).unwrap()),
            kind: Some(TransactionKind::Expense),
            sort: SortOrder::AmountDesc,
            ..Default::default()
        };
        let amounts: Vec<Cents> = filter_transactions(&conn, &jan_by_amount)
            .unwrap()
            .iter()
            .map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![1_200, 800]);
    }

    #[test]
    fn test_sort_order_parses() {
        assert_eq!("amount".parse::<SortOrder>().unwrap(), SortOrder::AmountDesc);
        assert_eq!("DATE-ASC".parse::<SortOrder>().unwrap(), SortOrder::DateAsc);
        assert!("newest".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_summary_excludes_transfers() {
        let (_dir, ledger, _, _) = test_db();
        let conn = ledger.connect().unwrap();
        let s = summary(&conn, DateRange::year(2025).unwrap()).unwrap();
        assert_eq!(s.income, 300_000);
        assert_eq!(s.expenses, 7_000);
        assert_eq!(s.net, 293_000);
        assert_eq!(
            total_by_kind(&conn, TransactionKind::Transfer, DateRange::year(2025).unwrap()).unwrap(),
            100_000
        );
    }

    #[test]
    fn test_category_totals_group_uncategorized() {
        let (_dir, ledger, _, _) = test_db();
        let conn = ledger.connect().unwrap();
        let totals = category_totals(&conn, CategoryKind::Expense, DateRange::year(2025).unwrap()).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].name, "Uncategorized");
        assert_eq!(totals[0].total, 5_000);
        assert_eq!(totals[1].name, "Food & Dining");
        assert_eq!(totals[1].total, 2_000);
        assert_eq!(totals[1].count, 2);
    }

    #[test]
    fn test_monthly_cashflow() {
        let (_dir, ledger, _, _) = test_db();
        let conn = ledger.connect().unwrap();
        let months = monthly_cashflow(&conn, DateRange::year(2025).unwrap()).unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2025-01");
        assert_eq!(months[0].net, 298_000);
        assert_eq!(months[1].expenses, 5_000);
    }

    #[test]
    fn test_net_worth_counts_active_accounts() {
        let (_dir, ledger, checking, savings) = test_db();
        let conn = ledger.connect().unwrap();
        // 50,000 + 300,000 - 7,000 - 100,000 on checking; 100,000 + 250 on savings
        assert_eq!(net_worth(&conn).unwrap(), 243_000 + 100_250);
        ledger.deactivate_account(savings).unwrap();
        assert_eq!(net_worth(&conn).unwrap(), ledger.account(checking).unwrap().balance);
    }
}
