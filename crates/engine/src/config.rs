//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `MARKETSTALL_DATA_DIR` - Directory for the file slot (default: .marketstall)
//! - `MARKETSTALL_CATALOG_PATH` - JSON product list (default: catalog.json)
//! - `MARKETSTALL_PERSISTENCE` - `best_effort` or `strict` (default: `best_effort`)
//! - `MARKETSTALL_CATALOG_TTL_SECS` - Catalog listing cache TTL (default: 300)
//! - `MARKETSTALL_CATALOG_CAPACITY` - Catalog cache capacity (default: 1000)
//! - `MARKETSTALL_SESSION_ID` - Browsing session that scopes the cart key

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::storage::{PersistencePolicy, keys};

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding one JSON file per slot key
    pub data_dir: PathBuf,
    /// Catalog file read by the memory catalog
    pub catalog_path: PathBuf,
    /// Durable-write failure policy
    pub persistence: PersistencePolicy,
    /// How long a catalog listing stays cached
    pub catalog_ttl: Duration,
    /// Maximum cached catalog entries
    pub catalog_capacity: u64,
    /// Browsing session ID, if the cart is session-scoped
    pub session_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".marketstall"),
            catalog_path: PathBuf::from("catalog.json"),
            persistence: PersistencePolicy::BestEffort,
            catalog_ttl: Duration::from_secs(300),
            catalog_capacity: 1000,
            session_id: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but cannot
    /// be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let persistence = get_or("MARKETSTALL_PERSISTENCE", "best_effort")
            .parse::<PersistencePolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("MARKETSTALL_PERSISTENCE".to_string(), e))?;
        let catalog_ttl = get_or("MARKETSTALL_CATALOG_TTL_SECS", "300")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MARKETSTALL_CATALOG_TTL_SECS".to_string(), e.to_string())
            })?;
        let catalog_capacity = get_or("MARKETSTALL_CATALOG_CAPACITY", "1000")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MARKETSTALL_CATALOG_CAPACITY".to_string(), e.to_string())
            })?;
        let session_id = lookup("MARKETSTALL_SESSION_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            data_dir: lookup("MARKETSTALL_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            catalog_path: lookup("MARKETSTALL_CATALOG_PATH")
                .map_or(defaults.catalog_path, PathBuf::from),
            persistence,
            catalog_ttl,
            catalog_capacity,
            session_id,
        })
    }

    /// Slot key for this session's cart.
    #[must_use]
    pub fn cart_key(&self) -> String {
        keys::cart(self.session_id.as_deref())
    }
}
