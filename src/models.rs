use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Signed amount in minor currency units (paise, cents).
pub type Cents = i64;

// ---------------------------------------------------------------------------
// Closed tag sets, stored as lowercase text keys
// ---------------------------------------------------------------------------

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $key:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn key(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            pub fn from_key(key: &str) -> Option<Self> {
                match key.trim().to_ascii_lowercase().as_str() {
                    $($key => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_key(s).ok_or_else(|| {
                    let keys: Vec<&str> = Self::ALL.iter().map(|v| v.key()).collect();
                    format!("expected one of: {}", keys.join(", "))
                })
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.key()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                Self::from_key(raw).ok_or_else(|| FromSqlError::Other(raw.to_string().into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Bank,
    CreditCard,
    Wallet,
    Cash,
    Other,
}

text_enum!(AccountKind {
    Bank => "bank",
    CreditCard => "credit_card",
    Wallet => "wallet",
    Cash => "cash",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Expense,
    Income,
}

text_enum!(CategoryKind {
    Expense => "expense",
    Income => "income",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

text_enum!(TransactionKind {
    Income => "income",
    Expense => "expense",
    Transfer => "transfer",
});

impl TransactionKind {
    /// Category polarity that fits this kind; transfers carry no category polarity.
    pub fn category_kind(self) -> Option<CategoryKind> {
        match self {
            Self::Income => Some(CategoryKind::Income),
            Self::Expense => Some(CategoryKind::Expense),
            Self::Transfer => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

text_enum!(Frequency {
    Daily => "daily",
    Weekly => "weekly",
    Biweekly => "biweekly",
    Monthly => "monthly",
    Quarterly => "quarterly",
    Yearly => "yearly",
});

impl Frequency {
    /// Advances `from` by one period. Month arithmetic clamps to the last day of
    /// a shorter month (Jan 31 + 1 month = Feb 28/29). `None` only past chrono's
    /// representable range.
    pub fn next_occurrence(self, from: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => from.checked_add_days(Days::new(1)),
            Self::Weekly => from.checked_add_days(Days::new(7)),
            Self::Biweekly => from.checked_add_days(Days::new(14)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Quarterly => from.checked_add_months(Months::new(3)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Biweekly => "Every 2 Weeks",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Monthly,
    Yearly,
}

text_enum!(BudgetPeriod {
    Monthly => "monthly",
    Yearly => "yearly",
});

impl BudgetPeriod {
    /// Last day of the period that begins on `start`.
    pub fn end_from(self, start: NaiveDate) -> Option<NaiveDate> {
        let months = match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        };
        start
            .checked_add_months(Months::new(months))?
            .checked_sub_days(Days::new(1))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub kind: AccountKind,
    pub opening_balance: Cents,
    pub balance: Cents,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub kind: AccountKind,
    pub opening_balance: Cents,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            kind,
            opening_balance: 0,
        }
    }

    pub fn with_opening_balance(mut self, opening_balance: Cents) -> Self {
        self.opening_balance = opening_balance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    pub is_default: bool,
    pub color: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryKind,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub to_account_id: Option<i64>,
    pub note: String,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
}

/// A transaction that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub to_account_id: Option<i64>,
    pub note: String,
}

impl NewTransaction {
    pub fn income(account_id: i64, amount: Cents, date: NaiveDate) -> Self {
        Self::single(account_id, amount, TransactionKind::Income, date)
    }

    pub fn expense(account_id: i64, amount: Cents, date: NaiveDate) -> Self {
        Self::single(account_id, amount, TransactionKind::Expense, date)
    }

    pub fn transfer(from: i64, to: i64, amount: Cents, date: NaiveDate) -> Self {
        Self {
            account_id: from,
            category_id: None,
            amount,
            kind: TransactionKind::Transfer,
            date,
            to_account_id: Some(to),
            note: String::new(),
        }
    }

    fn single(account_id: i64, amount: Cents, kind: TransactionKind, date: NaiveDate) -> Self {
        Self {
            account_id,
            category_id: None,
            amount,
            kind,
            date,
            to_account_id: None,
            note: String::new(),
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringRule {
    pub id: i64,
    pub name: String,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_occurrence: NaiveDate,
    pub last_executed: Option<NaiveDate>,
    pub to_account_id: Option<i64>,
    pub note: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub to_account_id: Option<i64>,
    pub note: String,
}

impl NewRule {
    pub fn new(
        name: impl Into<String>,
        account_id: i64,
        amount: Cents,
        kind: TransactionKind,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            account_id,
            category_id: None,
            amount,
            kind,
            frequency,
            start_date,
            end_date: None,
            to_account_id: None,
            note: String::new(),
        }
    }
}

/// A spending limit for one expense category, or for all expenses when
/// `category_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Budget {
    pub id: i64,
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Percentage of `amount` at which the budget starts warning.
    pub alert_percentage: u8,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub category_id: Option<i64>,
    pub amount: Cents,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub alert_percentage: u8,
}

impl NewBudget {
    pub fn new(category_id: Option<i64>, amount: Cents, period: BudgetPeriod, start_date: NaiveDate) -> Self {
        Self {
            category_id,
            amount,
            period,
            start_date,
            alert_percentage: 80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_roundtrip_through_from_str() {
        for kind in AccountKind::ALL {
            assert_eq!(kind.key().parse::<AccountKind>().unwrap(), *kind);
        }
        assert_eq!("Credit_Card".parse::<AccountKind>().unwrap(), AccountKind::CreditCard);
        assert!("savings".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_category_kind_for_transfer_is_none() {
        assert_eq!(TransactionKind::Income.category_kind(), Some(CategoryKind::Income));
        assert_eq!(TransactionKind::Transfer.category_kind(), None);
    }

    #[test]
    fn test_frequency_labels() {
        assert_eq!(Frequency::Biweekly.label(), "Every 2 Weeks");
        assert_eq!("quarterly".parse::<Frequency>().unwrap(), Frequency::Quarterly);
    }

    #[test]
    fn test_budget_period_end() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(BudgetPeriod::Monthly.end_from(d(2025, 1, 1)), Some(d(2025, 1, 31)));
        assert_eq!(BudgetPeriod::Monthly.end_from(d(2024, 2, 1)), Some(d(2024, 2, 29)));
        assert_eq!(BudgetPeriod::Yearly.end_from(d(2025, 4, 1)), Some(d(2026, 3, 31)));
    }
}
