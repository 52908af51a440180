use anyhow::bail;
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::models::Cents;
use pocketledger::reconciler;

use super::{open_ledger, today};

pub fn run(account: i64, balance: Option<Cents>, apply: bool) -> anyhow::Result<()> {
    let Some(observed) = balance else {
        bail!("--balance is required (or pass --history)");
    };
    let (settings, ledger) = open_ledger()?;
    let name = ledger.account(account)?.name;
    let apply_on = if apply { Some(today()) } else { None };
    let result = reconciler::reconcile(&ledger, account, observed, apply_on)?;

    if result.discrepancy == 0 {
        println!("{} {name}: {}", "Reconciled!".green(), settings.money(result.stored));
    } else if let Some(id) = result.adjustment_id {
        println!(
            "{} {name}: booked adjustment {id} of {}\n  Observed: {}\n  Was:      {}",
            "Reconciled!".green(),
            settings.money(result.discrepancy),
            settings.money(result.observed),
            settings.money(result.stored)
        );
    } else {
        println!(
            "{} {}\n  Observed: {}\n  Ledger:   {}\n  Run again with --apply to book the difference.",
            "DISCREPANCY:".red().bold(),
            settings.money(result.discrepancy),
            settings.money(result.observed),
            settings.money(result.stored)
        );
    }
    Ok(())
}

pub fn history(account: i64) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let name = ledger.account(account)?.name;
    let records = reconciler::history(&ledger, account)?;

    let mut table = Table::new();
    table.set_header(vec!["When", "Observed", "Ledger", "Difference", "Status", "Adjustment"]);
    for r in &records {
        let status = if r.is_reconciled {
            "reconciled".green().to_string()
        } else {
            "discrepancy".red().to_string()
        };
        table.add_row(vec![
            Cell::new(r.reconciled_at.format("%Y-%m-%d %H:%M")),
            Cell::new(settings.money(r.observed)),
            Cell::new(settings.money(r.stored)),
            Cell::new(settings.money(r.observed - r.stored)),
            Cell::new(status),
            Cell::new(r.adjustment_id.map(|id| id.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Reconciliations: {name}\n{table}");
    Ok(())
}
