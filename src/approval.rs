use chrono::NaiveDate;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::extractor::Candidate;
use crate::ledger::Ledger;
use crate::models::{Account, Category, NewTransaction};

const FALLBACK_CATEGORY: &str = "Others";
const FALLBACK_NOTE: &str = "Auto-added from message";

#[derive(Debug, Clone)]
pub struct ApprovalOptions {
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Used when the message itself carried no date.
    pub received: NaiveDate,
}

impl ApprovalOptions {
    pub fn received_on(received: NaiveDate) -> Self {
        Self {
            account_id: None,
            category_id: None,
            received,
        }
    }
}

/// Books an accepted candidate through the ledger and returns the new transaction id.
pub fn approve_candidate(ledger: &Ledger, candidate: &Candidate, options: &ApprovalOptions) -> Result<i64> {
    let account_id = match options.account_id {
        Some(id) => id,
        None => resolve_account(&ledger.accounts()?, candidate.account_hint.as_deref())?,
    };
    let category_id = match options.category_id {
        Some(id) => Some(id),
        None => match candidate.kind.category_kind() {
            Some(kind) => resolve_category(&ledger.categories(Some(kind))?, candidate.merchant.as_deref()),
            None => None,
        },
    };

    let new = NewTransaction {
        account_id,
        category_id,
        amount: candidate.amount,
        kind: candidate.kind,
        date: candidate.date.unwrap_or(options.received),
        to_account_id: None,
        note: candidate_note(candidate),
    };
    let id = ledger.insert_transaction(&new)?;
    info!(id, account = account_id, amount = candidate.amount, "booked candidate from message");
    Ok(id)
}

/// Prefers an active account whose name carries the hint's trailing digits,
/// then the first active account.
fn resolve_account(accounts: &[Account], hint: Option<&str>) -> Result<i64> {
    let active: Vec<&Account> = accounts.iter().filter(|a| a.is_active).collect();
    let digits: String = hint
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let tail = &digits[digits.len().saturating_sub(4)..];

    if !tail.is_empty() {
        if let Some(account) = active.iter().find(|a| a.name.contains(tail)) {
            return Ok(account.id);
        }
    }
    active
        .first()
        .map(|a| a.id)
        .ok_or_else(|| LedgerError::validation("account_id", "no active account to book into"))
}

fn resolve_category(categories: &[Category], merchant: Option<&str>) -> Option<i64> {
    if let Some(merchant) = merchant.map(str::to_lowercase) {
        let matched = categories.iter().find(|c| {
            let name = c.name.to_lowercase();
            merchant.contains(&name) || name.contains(&merchant)
        });
        if let Some(category) = matched {
            return Some(category.id);
        }
    }
    categories
        .iter()
        .find(|c| c.name == FALLBACK_CATEGORY)
        .or_else(|| categories.last())
        .map(|c| c.id)
}

fn candidate_note(candidate: &Candidate) -> String {
    match (&candidate.merchant, &candidate.account_hint) {
        (Some(merchant), Some(hint)) => format!("{merchant} - A/C: {hint}"),
        (Some(merchant), None) => merchant.clone(),
        (None, Some(hint)) => format!("A/C: {hint}"),
        (None, None) => FALLBACK_NOTE.to_string(),
    }
}
