use colored::Colorize;

use pocketledger::reports;
use pocketledger::settings::{load_settings, settings_file_exists};

use super::{open_ledger, today};

pub fn run() -> anyhow::Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Currency:   {} ({})", settings.currency, settings.currency_symbol);

    if !settings_file_exists() || !db_path.exists() {
        println!();
        println!("Database not found. Run `pocketledger init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {size} bytes");

    let (_, ledger) = open_ledger()?;
    let conn = ledger.connect()?;
    let accounts: i64 = conn.query_row("SELECT count(*) FROM accounts", [], |r| r.get(0))?;
    let transactions: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
    let rules: i64 = conn.query_row(
        "SELECT count(*) FROM recurring_rules WHERE is_active = 1",
        [],
        |r| r.get(0),
    )?;
    let due: i64 = conn.query_row(
        "SELECT count(*) FROM recurring_rules WHERE is_active = 1 AND next_occurrence <= ?1",
        [today()],
        |r| r.get(0),
    )?;

    println!();
    println!("Accounts:      {accounts}");
    println!("Transactions:  {transactions}");
    println!("Active rules:  {rules}");
    if due > 0 {
        println!("{}", format!("Due rules:     {due} (run `pocketledger recurring run`)").yellow());
    }
    println!("Net worth:     {}", settings.money(reports::net_worth(&conn)?));

    let drift = ledger.audit_balances()?;
    if drift.is_empty() {
        println!("Balances:      {}", "consistent".green());
    } else {
        for d in &drift {
            println!(
                "{} {} stores {}, transactions say {}",
                "DRIFT:".red().bold(),
                d.name,
                settings.money(d.stored),
                settings.money(d.expected)
            );
        }
    }
    Ok(())
}
