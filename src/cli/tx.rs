use std::collections::HashMap;

use anyhow::bail;
use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::models::{Cents, NewTransaction, Transaction, TransactionKind};
use pocketledger::reports::{self, DateRange, TransactionFilter};
use pocketledger::settings::Settings;
use pocketledger::Ledger;

use super::{open_ledger, today};

pub struct TxFields {
    pub account: Option<i64>,
    pub amount: Option<Cents>,
    pub kind: Option<TransactionKind>,
    pub to: Option<i64>,
    pub category: Option<i64>,
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

pub fn add(account: i64, amount: Cents, fields: TxFields) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let kind = fields.kind.unwrap_or(settings.default_kind);
    if kind == TransactionKind::Transfer && fields.to.is_none() {
        bail!("transfers need a destination account (--to)");
    }

    let new = NewTransaction {
        account_id: account,
        category_id: fields.category,
        amount,
        kind,
        date: fields.date.unwrap_or_else(today),
        to_account_id: if kind == TransactionKind::Transfer { fields.to } else { None },
        note: fields.note.unwrap_or_default(),
    };
    let id = ledger.insert_transaction(&new)?;
    println!("Recorded {kind} {id}: {}", settings.money(amount));
    Ok(())
}

pub fn edit(id: i64, fields: TxFields) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let old = ledger.transaction(id)?;
    let mut new = old.clone();

    if let Some(account) = fields.account {
        new.account_id = account;
    }
    if let Some(amount) = fields.amount {
        new.amount = amount;
    }
    if let Some(kind) = fields.kind {
        if kind != new.kind {
            // A category only fits the kind it was picked for.
            new.category_id = None;
        }
        new.kind = kind;
    }
    if new.kind == TransactionKind::Transfer {
        new.category_id = None;
        if fields.to.is_some() {
            new.to_account_id = fields.to;
        }
    } else {
        new.to_account_id = None;
    }
    if let Some(category) = fields.category {
        new.category_id = Some(category);
    }
    if let Some(date) = fields.date {
        new.date = date;
    }
    if let Some(note) = fields.note {
        new.note = note;
    }

    ledger.update_transaction(&old, &new)?;
    println!("Updated transaction {id}: {} {}", new.kind, settings.money(new.amount));
    Ok(())
}

pub fn delete(id: i64) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let transaction = ledger.transaction(id)?;
    if ledger.delete_transaction(&transaction)? {
        println!("Deleted transaction {id} ({})", settings.money(transaction.amount));
    } else {
        println!("Transaction {id} was already gone");
    }
    Ok(())
}

/// Date bounds for `tx list`; all unset lists the whole log.
pub struct ListPeriod {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

pub fn list(period: ListPeriod, mut filter: TransactionFilter) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let bounded = period.year.is_some()
        || period.month.is_some()
        || period.from_date.is_some()
        || period.to_date.is_some();
    if bounded {
        filter.range = Some(DateRange::resolve(
            period.year,
            period.month,
            period.from_date,
            period.to_date,
            today(),
        )?);
    }

    let mut title = match filter.account_id {
        Some(id) => format!("Transactions: {}", ledger.account(id)?.name),
        None => "Transactions".to_string(),
    };
    if let Some(range) = filter.range {
        title.push_str(&format!(" ({} to {})", range.from, range.to));
    }

    let transactions = reports::filter_transactions(&ledger.connect()?, &filter)?;
    println!("{title}\n{}", transaction_table(&ledger, &settings, &transactions)?);
    Ok(())
}

fn transaction_table(ledger: &Ledger, settings: &Settings, transactions: &[Transaction]) -> anyhow::Result<Table> {
    let accounts: HashMap<i64, String> = ledger.accounts()?.into_iter().map(|a| (a.id, a.name)).collect();
    let categories: HashMap<i64, String> = ledger
        .categories(None)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let name_of = |id: i64| accounts.get(&id).cloned().unwrap_or_else(|| format!("#{id}"));

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Account", "Kind", "Category", "Amount", "Note"]);
    for t in transactions {
        let account = match t.to_account_id {
            Some(to) => format!("{} -> {}", name_of(t.account_id), name_of(to)),
            None => name_of(t.account_id),
        };
        let amount = match t.kind {
            TransactionKind::Income => settings.money(t.amount).green().to_string(),
            TransactionKind::Expense => settings.money(t.amount).red().to_string(),
            TransactionKind::Transfer => settings.money(t.amount),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.date),
            Cell::new(account),
            Cell::new(t.kind),
            Cell::new(t.category_id.and_then(|id| categories.get(&id)).map_or("", |s| s.as_str())),
            Cell::new(amount),
            Cell::new(&t.note),
        ]);
    }
    Ok(table)
}
