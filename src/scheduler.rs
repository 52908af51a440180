use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rusqlite::params;
use tracing::{debug, error, info, warn};

use crate::db::{fetch_rule, rule_from_row, RULE_COLUMNS};
use crate::effect::{touched_accounts, validate_movement, validate_note, Movement};
use crate::error::{LedgerError, Result};
use crate::ledger::{check_references, Ledger};
use crate::models::{NewRule, NewTransaction, RecurringRule};

#[derive(Debug, Default)]
pub struct RunReport {
    pub materialized: usize,
    pub failed: usize,
    pub deactivated: usize,
    pub failures: Vec<RuleFailure>,
}

/// One rule that could not be processed; the rest of the run went ahead.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: i64,
    pub rule_name: String,
    pub error: LedgerError,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Stopped between rules; every rule processed so far is committed.
    Cancelled(RunReport),
    /// Another run was already in progress.
    Coalesced,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) | Self::Cancelled(report) => Some(report),
            Self::Coalesced => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Processed {
    Materialized(i64),
    Deactivated,
}

/// Clears the in-flight flag even if a run unwinds.
struct Flight<'a>(&'a AtomicBool);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    ledger: Arc<Ledger>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            running: AtomicBool::new(false),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn run(&self, now: NaiveDate) -> Result<RunOutcome> {
        self.run_with(now, &CancelToken::new())
    }

    /// Materializes at most one occurrence of every rule due on `now`.
    pub fn run_with(&self, now: NaiveDate, cancel: &CancelToken) -> Result<RunOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("scheduler run already in progress; coalescing");
            return Ok(RunOutcome::Coalesced);
        }
        let _flight = Flight(&self.running);

        let due = self.due_rules(now)?;
        let mut report = RunReport::default();
        for rule in due {
            if cancel.is_cancelled() {
                info!(materialized = report.materialized, "scheduler run cancelled");
                return Ok(RunOutcome::Cancelled(report));
            }
            match self.process(&rule, now) {
                Ok(Processed::Materialized(id)) => {
                    info!(rule = rule.id, name = %rule.name, transaction = id, "materialized recurring transaction");
                    report.materialized += 1;
                }
                Ok(Processed::Deactivated) => {
                    info!(rule = rule.id, name = %rule.name, "recurring rule ended; deactivated");
                    report.deactivated += 1;
                }
                Err(error) => {
                    warn!(rule = rule.id, name = %rule.name, %error, "recurring rule failed");
                    report.failed += 1;
                    report.failures.push(RuleFailure {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        error,
                    });
                }
            }
        }
        info!(
            materialized = report.materialized,
            failed = report.failed,
            deactivated = report.deactivated,
            "scheduler run finished"
        );
        Ok(RunOutcome::Completed(report))
    }

    fn process(&self, rule: &RecurringRule, now: NaiveDate) -> Result<Processed> {
        if rule.end_date.is_some_and(|end| now > end) {
            self.set_rule_active(rule.id, false)?;
            return Ok(Processed::Deactivated);
        }
        let next = rule
            .frequency
            .next_occurrence(rule.next_occurrence)
            .ok_or_else(|| LedgerError::validation("frequency", "next occurrence is out of range"))?;

        let draft = NewTransaction {
            account_id: rule.account_id,
            category_id: rule.category_id,
            amount: rule.amount,
            kind: rule.kind,
            date: now,
            to_account_id: rule.to_account_id,
            note: recurring_note(&rule.note, &rule.name),
        };
        let id = self.ledger.insert_transaction_then(&draft, |tx, _| {
            let changed = tx.execute(
                "UPDATE recurring_rules
                 SET next_occurrence = ?1, last_executed = ?2, modified_at = datetime('now')
                 WHERE id = ?3 AND next_occurrence = ?4 AND is_active = 1",
                params![next, now, rule.id, rule.next_occurrence],
            )?;
            if changed != 1 {
                return Err(LedgerError::validation(
                    "next_occurrence",
                    "rule was already advanced by another run",
                ));
            }
            Ok(())
        })?;
        Ok(Processed::Materialized(id))
    }

    /// Runs the scheduler for the local date every `every` on a background
    /// thread until the returned handle is stopped or dropped.
    pub fn spawn_periodic(self: &Arc<Self>, every: Duration) -> PeriodicRun {
        let (stop, stopped) = mpsc::channel::<()>();
        let cancel = CancelToken::new();
        let scheduler = Arc::clone(self);
        let token = cancel.clone();
        let handle = thread::spawn(move || loop {
            let today = Local::now().date_naive();
            match scheduler.run_with(today, &token) {
                Ok(RunOutcome::Coalesced) => debug!("periodic tick coalesced"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "periodic scheduler run failed"),
            }
            match stopped.recv_timeout(every) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        });
        PeriodicRun {
            stop,
            cancel,
            handle: Some(handle),
        }
    }

    // -----------------------------------------------------------------------
    // Rule management
    // -----------------------------------------------------------------------

    pub fn create_rule(&self, new: &NewRule) -> Result<i64> {
        validate_rule(&new.name, new, new.start_date, new.end_date, &new.note)?;
        let id = self.ledger.write("create recurring rule", |tx| {
            check_references(tx, new, new.category_id, &BTreeSet::new())?;
            tx.execute(
                "INSERT INTO recurring_rules
                    (name, account_id, category_id, amount, kind, frequency, start_date, end_date,
                     next_occurrence, to_account_id, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7, ?9, ?10)",
                params![
                    new.name.trim(),
                    new.account_id,
                    new.category_id,
                    new.amount,
                    new.kind,
                    new.frequency,
                    new.start_date,
                    new.end_date,
                    new.to_account_id,
                    new.note.trim(),
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!(id, name = %new.name.trim(), "created recurring rule");
        Ok(id)
    }

    /// Saves the user-editable fields of `rule`. A rule that has never run is
    /// re-anchored to its start date; otherwise its schedule position is kept.
    pub fn update_rule(&self, rule: &RecurringRule) -> Result<()> {
        validate_rule(&rule.name, rule, rule.start_date, rule.end_date, &rule.note)?;
        self.ledger.write("update recurring rule", |tx| {
            let stored = fetch_rule(tx, rule.id)?.ok_or(LedgerError::RuleNotFound(rule.id))?;
            check_references(tx, rule, rule.category_id, &touched_accounts(&stored))?;
            let next = match stored.last_executed {
                None => rule.start_date,
                Some(_) => stored.next_occurrence,
            };
            tx.execute(
                "UPDATE recurring_rules
                 SET name = ?1, account_id = ?2, category_id = ?3, amount = ?4, kind = ?5,
                     frequency = ?6, start_date = ?7, end_date = ?8, to_account_id = ?9,
                     note = ?10, next_occurrence = ?11, modified_at = datetime('now')
                 WHERE id = ?12",
                params![
                    rule.name.trim(),
                    rule.account_id,
                    rule.category_id,
                    rule.amount,
                    rule.kind,
                    rule.frequency,
                    rule.start_date,
                    rule.end_date,
                    rule.to_account_id,
                    rule.note.trim(),
                    next,
                    rule.id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn set_rule_active(&self, id: i64, active: bool) -> Result<()> {
        let changed = self.ledger.write("update recurring rule", |tx| {
            Ok(tx.execute(
                "UPDATE recurring_rules SET is_active = ?1, modified_at = datetime('now') WHERE id = ?2",
                params![active, id],
            )?)
        })?;
        if changed == 0 {
            return Err(LedgerError::RuleNotFound(id));
        }
        Ok(())
    }

    pub fn delete_rule(&self, id: i64) -> Result<()> {
        let changed = self.ledger.write("delete recurring rule", |tx| {
            Ok(tx.execute("DELETE FROM recurring_rules WHERE id = ?1", [id])?)
        })?;
        if changed == 0 {
            return Err(LedgerError::RuleNotFound(id));
        }
        Ok(())
    }

    pub fn rule(&self, id: i64) -> Result<RecurringRule> {
        let conn = self.ledger.connect()?;
        fetch_rule(&conn, id)?.ok_or(LedgerError::RuleNotFound(id))
    }

    pub fn rules(&self) -> Result<Vec<RecurringRule>> {
        let conn = self.ledger.connect()?;
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM recurring_rules ORDER BY is_active DESC, next_occurrence, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], rule_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Active rules whose next occurrence is on or before `now`, oldest first.
    pub fn due_rules(&self, now: NaiveDate) -> Result<Vec<RecurringRule>> {
        let conn = self.ledger.connect()?;
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM recurring_rules
             WHERE is_active = 1 AND next_occurrence <= ?1
             ORDER BY next_occurrence, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([now], rule_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// Handle to a background scheduler thread.
pub struct PeriodicRun {
    stop: mpsc::Sender<()>,
    cancel: CancelToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicRun {
    /// Cancels any run in progress and waits for the thread to exit.
    pub fn stop(mut self) {
        self.cancel.cancel();
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("periodic scheduler thread panicked");
            }
        }
    }
}

pub fn recurring_note(note: &str, name: &str) -> String {
    format!("{} (Recurring: {})", note.trim(), name.trim())
        .trim()
        .to_string()
}

fn validate_rule(
    name: &str,
    movement: &dyn Movement,
    start: NaiveDate,
    end: Option<NaiveDate>,
    note: &str,
) -> Result<()> {
    let len = name.trim().chars().count();
    if !(1..=50).contains(&len) {
        return Err(LedgerError::validation("name", "rule name must be 1 to 50 characters"));
    }
    validate_movement(movement)?;
    if end.is_some_and(|end| end < start) {
        return Err(LedgerError::validation("end_date", "must not be before the start date"));
    }
    validate_note(&recurring_note(note, name))
}
