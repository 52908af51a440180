use std::sync::Arc;

use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::models::{Cents, Frequency, NewRule, TransactionKind};
use pocketledger::scheduler::RunOutcome;
use pocketledger::Scheduler;

use super::{open_ledger, today};

pub struct RuleFields {
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub to: Option<i64>,
    pub category: Option<i64>,
    pub note: String,
}

fn scheduler() -> anyhow::Result<(pocketledger::settings::Settings, Scheduler)> {
    let (settings, ledger) = open_ledger()?;
    Ok((settings, Scheduler::new(Arc::new(ledger))))
}

pub fn add(name: &str, account: i64, amount: Cents, fields: RuleFields) -> anyhow::Result<()> {
    let (settings, scheduler) = scheduler()?;
    let mut rule = NewRule::new(
        name,
        account,
        amount,
        fields.kind,
        fields.frequency,
        fields.start.unwrap_or_else(today),
    );
    rule.end_date = fields.end;
    rule.to_account_id = fields.to;
    rule.category_id = fields.category;
    rule.note = fields.note;

    let id = scheduler.create_rule(&rule)?;
    println!(
        "Added recurring rule {id}: {} {} {}, first on {}",
        name.trim(),
        fields.frequency.label().to_lowercase(),
        settings.money(amount),
        rule.start_date
    );
    Ok(())
}

pub fn list() -> anyhow::Result<()> {
    let (settings, scheduler) = scheduler()?;
    let rules = scheduler.rules()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Kind", "Amount", "Frequency", "Next", "Last Run", "Ends", "Status"]);
    for rule in &rules {
        let status = if rule.is_active {
            "active".green().to_string()
        } else {
            "paused".yellow().to_string()
        };
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(&rule.name),
            Cell::new(rule.kind),
            Cell::new(settings.money(rule.amount)),
            Cell::new(rule.frequency.label()),
            Cell::new(rule.next_occurrence),
            Cell::new(rule.last_executed.map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(rule.end_date.map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(status),
        ]);
    }
    println!("Recurring Rules\n{table}");
    Ok(())
}

pub fn set_active(id: i64, active: bool) -> anyhow::Result<()> {
    let (_, scheduler) = scheduler()?;
    scheduler.set_rule_active(id, active)?;
    let name = scheduler.rule(id)?.name;
    if active {
        println!("Resumed rule {id}: {name}");
    } else {
        println!("Paused rule {id}: {name}");
    }
    Ok(())
}

pub fn delete(id: i64) -> anyhow::Result<()> {
    let (_, scheduler) = scheduler()?;
    let name = scheduler.rule(id)?.name;
    scheduler.delete_rule(id)?;
    println!("Deleted rule {id}: {name}");
    Ok(())
}

pub fn run(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let (_, scheduler) = scheduler()?;
    let now = date.unwrap_or_else(today);

    let report = match scheduler.run(now)? {
        RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => report,
        RunOutcome::Coalesced => {
            println!("A run is already in progress");
            return Ok(());
        }
    };

    println!("Materialized: {}", report.materialized);
    println!("Expired:      {}", report.deactivated);
    if report.failed > 0 {
        println!("{}", format!("Failed:       {}", report.failed).red());
        for failure in &report.failures {
            println!("  rule {} ({}): {}", failure.rule_id, failure.rule_name, failure.error);
        }
    }
    Ok(())
}
