use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Unknown account: {0}")]
    AccountNotFound(i64),

    #[error("Unknown category: {0}")]
    CategoryNotFound(i64),

    #[error("Unknown transaction: {0}")]
    TransactionNotFound(i64),

    #[error("Unknown recurring rule: {0}")]
    RuleNotFound(i64),

    #[error("Unknown budget: {0}")]
    BudgetNotFound(i64),

    /// The write sequence was rolled back; retry the whole operation.
    #[error("{operation} could not be committed, retry: {source}")]
    PartialWrite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{operation} timed out waiting for the store")]
    StoreTimeout { operation: &'static str },

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Wraps a storage failure raised while a mutation was in flight.
    pub(crate) fn write(operation: &'static str, source: rusqlite::Error) -> Self {
        if is_busy(&source) {
            return Self::StoreTimeout { operation };
        }
        Self::PartialWrite { operation, source }
    }

    /// Reclassifies a storage error raised inside a write unit.
    pub(crate) fn during(self, operation: &'static str) -> Self {
        match self {
            Self::Db(source) => Self::write(operation, source),
            other => other,
        }
    }

    /// True when the caller may retry the same logical operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PartialWrite { .. } | Self::StoreTimeout { .. })
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub type Result<T> = std::result::Result<T, LedgerError>;
