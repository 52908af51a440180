use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::models::{CategoryKind, Cents};
use pocketledger::reports::{self, DateRange};
use pocketledger::settings::Settings;

use super::{open_ledger, split_month, today, YearMonth};

pub fn summary(
    month: Option<YearMonth>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let (m_year, m_month) = split_month(month);
    let range = DateRange::resolve(year.or(m_year), m_month, from_date, to_date, today())?;
    let data = reports::summary(&ledger.connect()?, range)?;

    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Income".green().bold()), Cell::new(settings.money(data.income))]);
    table.add_row(vec![Cell::new("Expenses".red().bold()), Cell::new(settings.money(data.expenses))]);
    table.add_row(vec![Cell::new("Net".bold()), Cell::new(signed(&settings, data.net))]);
    println!("Summary {} to {}\n{table}", range.from, range.to);
    Ok(())
}

pub fn categories(kind: CategoryKind, month: Option<YearMonth>, year: Option<i32>) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let (m_year, m_month) = split_month(month);
    let range = DateRange::resolve(year.or(m_year), m_month, None, None, today())?;
    let totals = reports::category_totals(&ledger.connect()?, kind, range)?;
    let grand: Cents = totals.iter().map(|t| t.total).sum();

    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount", "%", "Count"]);
    for item in &totals {
        let pct = if grand == 0 { 0.0 } else { item.total as f64 * 100.0 / grand as f64 };
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(settings.money(item.total)),
            Cell::new(format!("{pct:.1}%")),
            Cell::new(item.count),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(settings.money(grand)),
        Cell::new(""),
        Cell::new(""),
    ]);
    let title = match kind {
        CategoryKind::Expense => "Expense Breakdown",
        CategoryKind::Income => "Income Breakdown",
    };
    println!("{title} {} to {}\n{table}", range.from, range.to);
    Ok(())
}

pub fn cashflow(year: Option<i32>) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let range = DateRange::resolve(year, None, None, None, today())?;
    let months = reports::monthly_cashflow(&ledger.connect()?, range)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Income", "Expenses", "Net", "Running"]);
    let mut running: Cents = 0;
    for m in &months {
        running += m.net;
        table.add_row(vec![
            Cell::new(&m.month),
            Cell::new(settings.money(m.income)),
            Cell::new(settings.money(m.expenses)),
            Cell::new(signed(&settings, m.net)),
            Cell::new(settings.money(running)),
        ]);
    }
    println!("Cash Flow\n{table}");
    Ok(())
}

pub fn balances() -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let accounts = ledger.accounts()?;
    let total = reports::net_worth(&ledger.connect()?)?;

    let mut table = Table::new();
    table.set_header(vec!["Account", "Type", "Balance"]);
    for account in accounts.iter().filter(|a| a.is_active) {
        table.add_row(vec![
            Cell::new(&account.name),
            Cell::new(account.kind),
            Cell::new(signed(&settings, account.balance)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Net Worth".bold()),
        Cell::new(""),
        Cell::new(signed(&settings, total)),
    ]);
    println!("Balances\n{table}");
    Ok(())
}

fn signed(settings: &Settings, cents: Cents) -> String {
    if cents >= 0 {
        settings.money(cents).green().to_string()
    } else {
        settings.money(cents).red().to_string()
    }
}
