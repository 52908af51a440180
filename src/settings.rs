use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::StoreOptions;
use crate::error::{LedgerError, Result};
use crate::fmt::{self, NumberFormat};
use crate::models::{Cents, TransactionKind};

/// Overrides the config directory (tests, portable installs).
pub const HOME_ENV: &str = "POCKETLEDGER_HOME";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default)]
    pub number_format: NumberFormat,
    #[serde(default = "default_kind")]
    pub default_kind: TransactionKind,
    /// Candidates scoring below this are reported but not booked.
    #[serde(default = "default_candidate_threshold")]
    pub candidate_threshold: f32,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_currency_symbol() -> String {
    "₹".to_string()
}

fn default_kind() -> TransactionKind {
    TransactionKind::Expense
}

fn default_candidate_threshold() -> f32 {
    0.5
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: config_dir().join("data").to_string_lossy().to_string(),
            currency: default_currency(),
            currency_symbol: default_currency_symbol(),
            number_format: NumberFormat::default(),
            default_kind: default_kind(),
            candidate_threshold: default_candidate_threshold(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn money(&self, cents: Cents) -> String {
        fmt::money(cents, &self.currency_symbol, self.number_format)
    }

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("ledger.db")
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pocketledger")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Falls back to defaults when the file is missing or unreadable.
pub fn load_settings() -> Settings {
    read_settings(&settings_path()).unwrap_or_default()
}

fn read_settings(path: &Path) -> Option<Settings> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    write_settings(&settings_path(), settings)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LedgerError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/ledger".to_string(),
            currency: "EUR".to_string(),
            currency_symbol: "€".to_string(),
            number_format: NumberFormat::European,
            default_kind: TransactionKind::Income,
            candidate_threshold: 0.7,
            store_timeout_ms: 250,
        };
        write_settings(&path, &settings).unwrap();
        let loaded = read_settings(&path).unwrap();
        assert_eq!(loaded.currency, "EUR");
        assert_eq!(loaded.number_format, NumberFormat::European);
        assert_eq!(loaded.default_kind, TransactionKind::Income);
        assert_eq!(loaded.store_options().timeout, Duration::from_millis(250));
        assert_eq!(loaded.money(123_456), "€1.234,56");
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "number_format": "international"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.currency, "INR");
        assert_eq!(s.currency_symbol, "₹");
        assert_eq!(s.number_format, NumberFormat::International);
        assert_eq!(s.default_kind, TransactionKind::Expense);
        assert_eq!(s.candidate_threshold, 0.5);
        assert_eq!(s.db_path(), PathBuf::from("/tmp/test/ledger.db"));
    }

    #[test]
    fn test_unreadable_file_gives_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_settings(&path).is_none());
        assert!(read_settings(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.money(250_000), "₹2,500.00");
        assert!(!s.data_dir.is_empty());
    }
}
