//! Environment-driven configuration.

use crate::store::StoreConfig;
use crate::worker::WorkerConfig;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store backend to operate against.
    pub store: StoreConfig,
    /// Settlement worker tuning.
    pub worker: WorkerConfig,
    /// Shared secret guarding the settlement trigger. Unset disables
    /// triggered batches.
    pub trigger_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `STORE_BACKEND` selects `memory` (default), `sqlite`, or
    /// `postgres`; the latter two read their connection string from
    /// `STORE_URL`.
    pub fn from_env() -> Self {
        let store = match std::env::var("STORE_BACKEND").ok().as_deref() {
            Some("sqlite") => StoreConfig::Sqlite {
                url: std::env::var("STORE_URL")
                    .unwrap_or_else(|_| "sqlite::memory:".to_string()),
            },
            Some("postgres") => StoreConfig::Postgres {
                url: std::env::var("STORE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/questline_settler".to_string()),
            },
            _ => StoreConfig::Memory,
        };

        let trigger_secret = std::env::var("SETTLE_TRIGGER_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            store,
            worker: WorkerConfig::from_env(),
            trigger_secret,
        }
    }
}
