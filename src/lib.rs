pub mod approval;
pub mod budgets;
pub mod db;
pub mod effect;
pub mod error;
pub mod extractor;
pub mod fmt;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod reconciler;
pub mod reports;
pub mod scheduler;
pub mod settings;

use std::sync::Once;

pub use approval::{approve_candidate, ApprovalOptions};
pub use db::{Store, StoreOptions};
pub use error::{LedgerError, Result};
pub use extractor::{extract_candidate, Candidate};
pub use ledger::Ledger;
pub use scheduler::{CancelToken, RunOutcome, RunReport, Scheduler};

static TRACING_INIT: Once = Once::new();

/// Installs the stderr subscriber once per process. `RUST_LOG` overrides the
/// default `pocketledger=info` filter.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pocketledger=info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
