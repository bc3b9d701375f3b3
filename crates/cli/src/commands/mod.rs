//! Command implementations and the session they run against.
//!
//! # Environment Variables
//!
//! Read through `EngineConfig::from_env` (see `marketstall_engine::config`):
//! data directory, catalog file, persistence policy, catalog cache settings
//! and the browsing session ID.

use std::sync::Arc;

use marketstall_core::{UserId, UserRole};
use marketstall_engine::{
    CachedCatalog, Collaborators, CommerceError, ConfigError, CurrentUser, EngineConfig,
    FileSlot, LocalOrderService, LocalRefundGateway, MemoryCatalog, Persistence, RemoteError,
    SessionContext, SharedSlot, StaticAuth,
};
use thiserror::Error;

pub mod cart;
pub mod orders;
pub mod profile;

/// Session over the file slot with the slot-backed collaborators.
pub type LocalSession = SessionContext<
    StaticAuth,
    CachedCatalog<MemoryCatalog>,
    LocalOrderService,
    LocalRefundGateway,
>;

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog unavailable: {0}")]
    Catalog(#[from] RemoteError),

    #[error(transparent)]
    Commerce(#[from] CommerceError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Who the session is opened for.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub user_id: Option<i32>,
    pub admin: bool,
}

impl SessionOptions {
    fn auth(self) -> StaticAuth {
        self.user_id.map_or_else(StaticAuth::anonymous, |id| {
            let role = if self.admin {
                UserRole::Admin
            } else {
                UserRole::Customer
            };
            StaticAuth::signed_in(CurrentUser {
                id: UserId::new(id),
                role,
            })
        })
    }
}

/// Open a session from environment configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the catalog file
/// cannot be read, or the session fails to open.
pub async fn open_session(options: SessionOptions) -> Result<LocalSession, CommandError> {
    let config = EngineConfig::from_env()?;

    let slot: SharedSlot = Arc::new(FileSlot::new(config.data_dir.clone()));
    let persistence = Persistence::new(Arc::clone(&slot), config.persistence);

    let catalog = MemoryCatalog::from_json_file(&config.catalog_path)?;
    let collaborators = Collaborators {
        auth: options.auth(),
        catalog: CachedCatalog::new(catalog, config.catalog_capacity, config.catalog_ttl),
        orders: LocalOrderService::new(Arc::clone(&slot)),
        refunds: LocalRefundGateway::new(slot),
    };

    tracing::debug!(
        data_dir = %config.data_dir.display(),
        catalog = %config.catalog_path.display(),
        policy = ?config.persistence,
        "Opening session"
    );
    let session = SessionContext::open(collaborators, persistence, config.cart_key()).await?;
    Ok(session)
}
