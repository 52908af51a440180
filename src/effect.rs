//! Balance effects of a transaction, independent of storage.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LedgerError, Result};
use crate::models::{Cents, NewRule, NewTransaction, RecurringRule, Transaction, TransactionKind};

pub const NOTE_MAX_CHARS: usize = 200;

/// Anything that moves money between accounts: persisted transactions, drafts
/// and recurring rules all share the same validation and effect rules.
pub trait Movement {
    fn kind(&self) -> TransactionKind;
    fn account_id(&self) -> i64;
    fn to_account_id(&self) -> Option<i64>;
    fn amount(&self) -> Cents;
}

macro_rules! movement {
    ($ty:ty) => {
        impl Movement for $ty {
            fn kind(&self) -> TransactionKind {
                self.kind
            }
            fn account_id(&self) -> i64 {
                self.account_id
            }
            fn to_account_id(&self) -> Option<i64> {
                self.to_account_id
            }
            fn amount(&self) -> Cents {
                self.amount
            }
        }
    };
}

movement!(Transaction);
movement!(NewTransaction);
movement!(RecurringRule);
movement!(NewRule);

/// Signed deltas a movement applies: one entry for income/expense, two for a transfer.
pub fn effect(m: &dyn Movement) -> Vec<(i64, Cents)> {
    match m.kind() {
        TransactionKind::Income => vec![(m.account_id(), m.amount())],
        TransactionKind::Expense => vec![(m.account_id(), -m.amount())],
        TransactionKind::Transfer => {
            let mut deltas = vec![(m.account_id(), -m.amount())];
            if let Some(to) = m.to_account_id() {
                deltas.push((to, m.amount()));
            }
            deltas
        }
    }
}

/// Net change per account of undoing `revert` and then applying `apply`.
/// Accounts whose deltas cancel out are omitted.
pub fn net_deltas(revert: Option<&dyn Movement>, apply: Option<&dyn Movement>) -> BTreeMap<i64, Cents> {
    let mut net: BTreeMap<i64, Cents> = BTreeMap::new();
    if let Some(old) = revert {
        for (account, delta) in effect(old) {
            *net.entry(account).or_insert(0) -= delta;
        }
    }
    if let Some(new) = apply {
        for (account, delta) in effect(new) {
            *net.entry(account).or_insert(0) += delta;
        }
    }
    net.retain(|_, delta| *delta != 0);
    net
}

/// Every account a movement references, whether or not its delta nets to zero.
pub fn touched_accounts(m: &dyn Movement) -> BTreeSet<i64> {
    let mut accounts = BTreeSet::from([m.account_id()]);
    accounts.extend(m.to_account_id());
    accounts
}

pub fn validate_movement(m: &dyn Movement) -> Result<()> {
    if m.amount() <= 0 {
        return Err(LedgerError::validation("amount", "must be greater than zero"));
    }
    match (m.kind(), m.to_account_id()) {
        (TransactionKind::Transfer, None) => Err(LedgerError::validation(
            "to_account_id",
            "a transfer needs a destination account",
        )),
        (TransactionKind::Transfer, Some(to)) if to == m.account_id() => Err(
            LedgerError::validation("to_account_id", "cannot transfer to the same account"),
        ),
        (TransactionKind::Income | TransactionKind::Expense, Some(_)) => Err(
            LedgerError::validation("to_account_id", "only transfers have a destination account"),
        ),
        _ => Ok(()),
    }
}

pub fn validate_note(note: &str) -> Result<()> {
    if note.chars().count() > NOTE_MAX_CHARS {
        return Err(LedgerError::validation(
            "note",
            format!("must be at most {NOTE_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}
