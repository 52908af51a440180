//! Heuristic extraction of a transaction candidate from bank notification text.
//!
//! Everything here is pure: the same sender and body always produce the same
//! candidate, and malformed input yields `None` rather than an error.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::fmt::{self, parse_amount, NumberFormat};
use crate::models::{Cents, TransactionKind};

const INSTITUTION_KEYWORDS: &[&str] = &[
    "bank", "hdfc", "icici", "sbi", "axis", "kotak", "paytm", "phonepe", "gpay", "googlepay",
    "amazon", "flipkart",
];

const ACCOUNT_TOKENS: &[&str] = &["a/c", "account", "card", "upi"];

const DEBIT_KEYWORDS: &[&str] = &[
    "debited", "debit", "spent", "paid", "purchase", "withdrawn", "payment", "transaction",
    "used", "bought", "charged",
];

const CREDIT_KEYWORDS: &[&str] = &[
    "credited", "credit", "received", "deposited", "refund", "cashback", "reward", "salary",
    "transfer in",
];

const CORPORATE_SUFFIXES: &[&str] = &["PVT", "LTD", "LIMITED", "INC", "CORP", "CO"];

// "debited to your account" names no merchant
const MERCHANT_STOPWORDS: &[&str] = &["account", "acct", "a/c", "ac", "card", "your", "you", "self"];

// confidence points, out of 100
const AMOUNT_POINTS: u32 = 40;
const DIRECTION_POINTS: u32 = 30;
const MERCHANT_POINTS: u32 = 20;
const INSTITUTION_POINTS: u32 = 10;

// all fraction digits; `parse_amount` rejects more than two
const NUMBER: &str = r"([0-9][0-9,]*(?:\.[0-9]+)?)";

fn compile(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{NUMBER}", NUMBER)).expect("invalid extractor regex")
}

static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:\brs\.?|\binr|₹)\s*{NUMBER}",
        r"(?i)\b(?:amount|amt)\s*:?\s*(?:rs\.?|inr|₹)?\s*{NUMBER}",
        r"(?i)\b{NUMBER}\s*(?:rs\b|inr\b|₹)",
        r"(?i)\b(?:debited|credited|paid|received)\s+(?:(?:by|with|of|for)\s+)?(?:rs\.?|inr|₹)?\s*{NUMBER}",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static MERCHANT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:at|to|from)\s+([a-z][a-z0-9&\- ]*?)(?:\s+on\b|\s+dated\b|\s+is\b|\s+via\b|\s+ref\b|\.|,|$)",
        r"(?i)\b(?:merchant|vendor|info)\s*:\s*([a-z][a-z0-9&\- ]*?)(?:\s+on\b|\s+dated\b|\.|,|$)",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static ACCOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:a/c|account|card)\s*(?:ending(?:\s+in|\s+with)?|no\.?)\s*:?\s*([x*0-9]{4,})",
        r"(?i)\b(?:a/c|acct|card)\s+([x*]+-?[0-9]{3,})",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static BALANCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:avl\.?\s*bal(?:ance)?|available\s+bal(?:ance)?|bal(?:ance)?)\b\s*(?:is\s+)?:?\s*(?:rs\.?|inr|₹)?\s*{NUMBER}",
    )
});

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(\d{1,2})[-/](\d{1,2})[-/](\d{4}|\d{2})\b"));

static MONTH_NAME_DATE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(\d{1,2})[-\s]?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[-\s,]*(\d{4}|\d{2})\b",
    )
});

/// An unconfirmed transaction guessed from a message. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub amount: Cents,
    pub kind: TransactionKind,
    pub merchant: Option<String>,
    pub account_hint: Option<String>,
    /// Post-transaction balance quoted in the message.
    pub balance: Option<Cents>,
    pub date: Option<NaiveDate>,
    pub confidence: f32,
}

impl Candidate {
    pub fn meets(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    pub fn summary(&self, symbol: &str, format: NumberFormat) -> String {
        let kind = match self.kind {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
            TransactionKind::Transfer => "Transfer",
        };
        let mut lines = vec![format!("{kind}: {}", fmt::money(self.amount, symbol, format))];
        if let Some(merchant) = &self.merchant {
            lines.push(format!("Merchant: {merchant}"));
        }
        if let Some(hint) = &self.account_hint {
            lines.push(format!("Account: {hint}"));
        }
        if let Some(balance) = self.balance {
            lines.push(format!("Balance: {}", fmt::money(balance, symbol, format)));
        }
        if let Some(date) = self.date {
            lines.push(format!("Date: {date}"));
        }
        lines.push(format!("Confidence: {:.0}%", self.confidence * 100.0));
        lines.join("\n")
    }
}

/// Extracts a candidate from a message, or `None` when the message does not
/// look like a bank notification, its direction is unclear, or no amount is found.
pub fn extract_candidate(sender: &str, body: &str) -> Option<Candidate> {
    let sender_lower = sender.to_lowercase();
    let body_lower = body.to_lowercase();

    let institution = INSTITUTION_KEYWORDS
        .iter()
        .any(|k| sender_lower.contains(k) || body_lower.contains(k));
    let mentions_account = ACCOUNT_TOKENS.iter().any(|t| body_lower.contains(t));
    if !institution && !mentions_account {
        return None;
    }

    let kind = direction(&body_lower)?;
    let amount = extract_amount(body)?;
    let merchant = extract_merchant(body);

    let mut points = AMOUNT_POINTS + DIRECTION_POINTS;
    if merchant.is_some() {
        points += MERCHANT_POINTS;
    }
    if institution {
        points += INSTITUTION_POINTS;
    }

    Some(Candidate {
        amount,
        kind,
        merchant,
        account_hint: extract_account_hint(body),
        balance: extract_balance(body),
        date: extract_date(body),
        confidence: points.min(100) as f32 / 100.0,
    })
}

fn direction(body_lower: &str) -> Option<TransactionKind> {
    let debit = DEBIT_KEYWORDS.iter().any(|k| body_lower.contains(k));
    let credit = CREDIT_KEYWORDS.iter().any(|k| body_lower.contains(k));
    match (debit, credit) {
        (true, false) => Some(TransactionKind::Expense),
        (false, true) => Some(TransactionKind::Income),
        _ => None,
    }
}

fn extract_amount(body: &str) -> Option<Cents> {
    AMOUNT_PATTERNS.iter().find_map(|re| {
        re.captures_iter(body)
            .filter_map(|caps| standalone_number(body, &caps))
            .find_map(|raw| parse_amount(raw).filter(|cents| *cents > 0))
    })
}

/// The captured number, unless it runs straight on into letters or digits
/// the pattern did not consume (`1e5`, `1.2.3`).
fn standalone_number<'h>(body: &'h str, caps: &regex::Captures<'h>) -> Option<&'h str> {
    let number = caps.get(1)?;
    if caps.get(0)?.end() > number.end() {
        return Some(number.as_str());
    }
    let mut rest = body[number.end()..].chars();
    match (rest.next(), rest.next()) {
        (Some(c), _) if c.is_alphanumeric() => None,
        (Some('.'), Some(d)) if d.is_ascii_digit() => None,
        _ => Some(number.as_str()),
    }
}

fn extract_merchant(body: &str) -> Option<String> {
    MERCHANT_PATTERNS.iter().find_map(|re| {
        re.captures_iter(body)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| clean_merchant(m.as_str()))
    })
}

/// Drops corporate suffixes and title-cases what remains.
fn clean_merchant(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split_whitespace()
        .filter(|w| !CORPORATE_SUFFIXES.contains(&w.to_uppercase().as_str()))
        .map(title_case)
        .collect();
    let first = words.first()?.to_lowercase();
    if MERCHANT_STOPWORDS.contains(&first.as_str()) {
        return None;
    }
    let name = words.join(" ");
    (name.chars().count() > 2).then_some(name)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn extract_account_hint(body: &str) -> Option<String> {
    ACCOUNT_PATTERNS
        .iter()
        .find_map(|re| Some(re.captures(body)?.get(1)?.as_str().to_string()))
}

fn extract_balance(body: &str) -> Option<Cents> {
    let caps = BALANCE_PATTERN.captures(body)?;
    parse_amount(standalone_number(body, &caps)?)
}

fn extract_date(body: &str) -> Option<NaiveDate> {
    if let Some(caps) = NUMERIC_DATE.captures(body) {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        if let Some(date) = full_year(&caps[3]).and_then(|y| NaiveDate::from_ymd_opt(y, month, day)) {
            return Some(date);
        }
    }
    let caps = MONTH_NAME_DATE.captures(body)?;
    let day = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    NaiveDate::from_ymd_opt(full_year(&caps[3])?, month, day)
}

fn full_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
