use std::io::Read;

use anyhow::Context;
use colored::Colorize;

use pocketledger::{approve_candidate, extract_candidate, ApprovalOptions};

use super::{open_ledger, today};

pub struct ExtractOptions {
    pub book: bool,
    pub account: Option<i64>,
    pub category: Option<i64>,
    pub json: bool,
}

pub fn run(sender: &str, body: Option<String>, options: ExtractOptions) -> anyhow::Result<()> {
    let body = match body {
        Some(body) => body,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading message from stdin")?;
            buf
        }
    };

    let Some(candidate) = extract_candidate(sender, &body) else {
        println!("No transaction found in message");
        return Ok(());
    };

    let (settings, ledger) = open_ledger()?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&candidate)?);
    } else {
        println!("{}", candidate.summary(&settings.currency_symbol, settings.number_format));
    }

    if !options.book {
        return Ok(());
    }
    if !candidate.meets(settings.candidate_threshold) {
        println!(
            "{}",
            format!(
                "Not booked: confidence below {:.0}%",
                settings.candidate_threshold * 100.0
            )
            .yellow()
        );
        return Ok(());
    }

    let approval = ApprovalOptions {
        account_id: options.account,
        category_id: options.category,
        received: today(),
    };
    let id = approve_candidate(&ledger, &candidate, &approval)?;
    let transaction = ledger.transaction(id)?;
    let account = ledger.account(transaction.account_id)?;
    println!(
        "{} transaction {id} on {} (balance {})",
        "Booked".green(),
        account.name,
        settings.money(account.balance)
    );
    Ok(())
}
