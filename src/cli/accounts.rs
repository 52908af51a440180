use anyhow::bail;
use colored::Colorize;
use comfy_table::{Cell, Table};

use pocketledger::models::{AccountKind, Cents, NewAccount};

use super::open_ledger;

pub fn add(name: &str, kind: AccountKind, opening: Cents) -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let id = ledger.create_account(&NewAccount::new(name, kind).with_opening_balance(opening))?;
    println!("Added account {id}: {} ({})", name.trim(), settings.money(opening));
    Ok(())
}

pub fn list() -> anyhow::Result<()> {
    let (settings, ledger) = open_ledger()?;
    let accounts = ledger.accounts()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Opening", "Balance", "Status"]);
    for account in &accounts {
        let status = if account.is_active {
            "active".green().to_string()
        } else {
            "inactive".dimmed().to_string()
        };
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(&account.name),
            Cell::new(account.kind),
            Cell::new(settings.money(account.opening_balance)),
            Cell::new(settings.money(account.balance)),
            Cell::new(status),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}

pub fn set_active(id: i64, active: bool) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    ledger.set_account_active(id, active)?;
    let name = ledger.account(id)?.name;
    if active {
        println!("Activated account {id}: {name}");
    } else {
        println!("Deactivated account {id}: {name}");
    }
    Ok(())
}

pub fn delete(id: i64, yes: bool) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    let name = ledger.account(id)?.name;
    if !yes {
        bail!("deleting '{name}' removes all of its transactions and recurring rules; pass --yes to confirm");
    }
    let removed = ledger.delete_account(id)?;
    println!(
        "Deleted account {id}: {name} ({} transactions, {} recurring rules)",
        removed.transactions, removed.rules
    );
    Ok(())
}
