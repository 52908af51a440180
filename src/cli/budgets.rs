use chrono::{Datelike, NaiveDate};
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::budgets::{self, BudgetStatus};
use pocketledger::models::{BudgetPeriod, Cents, NewBudget};

use super::{open_ledger, today};

fn period_start(period: BudgetPeriod, day: NaiveDate) -> NaiveDate {
    let start = match period {
        BudgetPeriod::Monthly => day.with_day(1),
        BudgetPeriod::Yearly => NaiveDate::from_ymd_opt(day.year(), 1, 1),
    };
    start.unwrap_or(day)
}

pub fn set(
    amount: Cents,
    category: Option<i64>,
    period: BudgetPeriod,
    start: Option<NaiveDate>,
    alert: u8,
) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let start = start.unwrap_or_else(|| period_start(period, today()));
    let mut new = NewBudget::new(category, amount, period, start);
    new.alert_percentage = alert;
    let id = budgets::create_budget(&ledger, &new)?;

    let scope = match category {
        Some(category_id) => ledger.category(category_id)?.name,
        None => "all expenses".to_string(),
    };
    println!("Added {period} budget {id}: {} for {scope}, from {start}", settings.money(amount));
    Ok(())
}

pub fn status(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let current = budgets::current_budgets(&ledger, date.unwrap_or_else(today))?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Budget", "Limit", "Spent", "Remaining", "Used"]);
    for status in &current {
        table.add_row(vec![
            Cell::new(status.budget.id),
            Cell::new(scope(status)),
            Cell::new(settings.money(status.budget.amount)),
            Cell::new(settings.money(status.spent)),
            Cell::new(settings.money(status.remaining)),
            Cell::new(used(status)),
        ]);
    }
    println!("Budgets\n{table}");
    Ok(())
}

pub fn list() -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let all = budgets::budgets(&ledger)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Category", "Limit", "Period", "From", "To", "Alert", "Status"]);
    for budget in &all {
        let category = match budget.category_id {
            Some(id) => ledger.category(id)?.name,
            None => "All expenses".to_string(),
        };
        table.add_row(vec![
            Cell::new(budget.id),
            Cell::new(category),
            Cell::new(settings.money(budget.amount)),
            Cell::new(budget.period),
            Cell::new(budget.start_date),
            Cell::new(budget.end_date),
            Cell::new(format!("{}%", budget.alert_percentage)),
            Cell::new(if budget.is_active { "active" } else { "inactive" }),
        ]);
    }
    println!("All Budgets\n{table}");
    Ok(())
}

pub fn deactivate(id: i64) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    budgets::set_budget_active(&ledger, id, false)?;
    println!("Deactivated budget {id}");
    Ok(())
}

pub fn delete(id: i64) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    budgets::delete_budget(&ledger, id)?;
    println!("Deleted budget {id}");
    Ok(())
}

fn scope(status: &BudgetStatus) -> String {
    status.category.clone().unwrap_or_else(|| "All expenses".to_string())
}

fn used(status: &BudgetStatus) -> String {
    let pct = format!("{:.0}%", status.percent_used);
    if status.is_over() {
        format!("{pct} over").red().bold().to_string()
    } else if status.should_alert() {
        pct.yellow().to_string()
    } else {
        pct.green().to_string()
    }
}
