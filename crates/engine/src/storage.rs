//! Durable key-value slot.
//!
//! Stores persist their whole collection as one JSON value under a fixed
//! key. No schema versioning is performed: a format change needs a
//! coordinated migration of the stored values.
//!
//! # Keys
//!
//! - `cart` / `cart-{session}` - cart lines for a browsing session
//! - `addresses-{userId}` - saved addresses
//! - `paymentMethods-{userId}` - saved payment methods
//! - `orders`, `refunds` - records kept by the local collaborators

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::RemoteError;

/// Errors raised by a [`KeyValueSlot`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("slot is read-only")]
    ReadOnly,

    #[error("slot lock poisoned")]
    Poisoned,
}

/// A durable byte store addressed by string keys.
pub trait KeyValueSlot: Send + Sync {
    /// Read the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Shared handle to a slot.
pub type SharedSlot = Arc<dyn KeyValueSlot>;

/// Slot key builders.
pub mod keys {
    use marketstall_core::UserId;

    /// Cart key for the default session.
    pub const CART: &str = "cart";

    /// Orders kept by the local order service.
    pub const ORDERS: &str = "orders";

    /// Refund requests kept by the local refund gateway.
    pub const REFUNDS: &str = "refunds";

    /// Cart key, scoped to `session` when one is given.
    #[must_use]
    pub fn cart(session: Option<&str>) -> String {
        session.map_or_else(|| CART.to_string(), |s| format!("{CART}-{s}"))
    }

    #[must_use]
    pub fn addresses(user_id: UserId) -> String {
        format!("addresses-{user_id}")
    }

    #[must_use]
    pub fn payment_methods(user_id: UserId) -> String {
        format!("paymentMethods-{user_id}")
    }
}

/// Read and decode a JSON value.
///
/// # Errors
///
/// Returns `StorageError` if the slot fails or the stored bytes do not decode.
pub fn load_json<T: DeserializeOwned>(
    slot: &dyn KeyValueSlot,
    key: &str,
) -> Result<Option<T>, StorageError> {
    slot.get(key)?
        .map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(StorageError::from)
}

/// Encode and write a JSON value.
///
/// # Errors
///
/// Returns `StorageError` if encoding or the write fails.
pub fn store_json<T: Serialize + ?Sized>(
    slot: &dyn KeyValueSlot,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    slot.set(key, &bytes)
}

// =============================================================================
// Persistence policy
// =============================================================================

/// What a store does when its durable write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistencePolicy {
    /// Commit in memory, log the failure.
    #[default]
    BestEffort,
    /// Write first; on failure return `RemoteFailure` and keep the old state.
    Strict,
}

impl std::str::FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("invalid persistence policy: {s}")),
        }
    }
}

/// A slot plus the policy stores apply when writing to it.
#[derive(Clone)]
pub struct Persistence {
    slot: SharedSlot,
    policy: PersistencePolicy,
}

impl Persistence {
    #[must_use]
    pub fn new(slot: SharedSlot, policy: PersistencePolicy) -> Self {
        Self { slot, policy }
    }

    #[must_use]
    pub fn slot(&self) -> &dyn KeyValueSlot {
        self.slot.as_ref()
    }

    #[must_use]
    pub const fn policy(&self) -> PersistencePolicy {
        self.policy
    }

    /// Decode the value at `key`, treating unreadable data as absent.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match load_json(self.slot(), key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable slot value");
                None
            }
        }
    }

    /// Write `value` under `key` according to the policy.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Storage` only under [`PersistencePolicy::Strict`].
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), RemoteError> {
        match store_json(self.slot(), key, value) {
            Ok(()) => Ok(()),
            Err(e) => match self.policy {
                PersistencePolicy::BestEffort => {
                    tracing::warn!(key, error = %e, "Durable write failed, keeping state in memory");
                    Ok(())
                }
                PersistencePolicy::Strict => Err(RemoteError::Storage(e)),
            },
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// MemorySlot
// =============================================================================

/// In-memory slot for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySlot {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    read_only: AtomicBool,
}

impl MemorySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent `set` fail with `StorageError::ReadOnly`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl KeyValueSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::ReadOnly);
        }
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

// =============================================================================
// FileSlot
// =============================================================================

/// Slot backed by a directory, one `{key}.json` file per key.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueSlot for FileSlot {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write-then-rename; readers never see a partial value
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketstall_core::UserId;

    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(keys::cart(None), "cart");
        assert_eq!(keys::cart(Some("abc")), "cart-abc");
        assert_eq!(keys::addresses(UserId::new(5)), "addresses-5");
        assert_eq!(keys::payment_methods(UserId::new(5)), "paymentMethods-5");
    }

    #[test]
    fn test_memory_slot_roundtrip() {
        let slot = MemorySlot::new();
        assert!(slot.get("k").unwrap().is_none());
        store_json(&slot, "k", &vec![1, 2, 3]).unwrap();
        let back: Option<Vec<i32>> = load_json(&slot, "k").unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_read_only_slot() {
        let slot = MemorySlot::new();
        slot.set_read_only(true);
        assert!(matches!(slot.set("k", b"x"), Err(StorageError::ReadOnly)));
    }

    #[test]
    fn test_best_effort_swallows_write_failure() {
        let slot = MemorySlot::shared();
        slot.set_read_only(true);
        let persistence = Persistence::new(slot, PersistencePolicy::BestEffort);
        assert!(persistence.write("k", &1).is_ok());
    }

    #[test]
    fn test_strict_surfaces_write_failure() {
        let slot = MemorySlot::shared();
        slot.set_read_only(true);
        let persistence = Persistence::new(slot, PersistencePolicy::Strict);
        assert!(matches!(
            persistence.write("k", &1),
            Err(RemoteError::Storage(StorageError::ReadOnly))
        ));
    }

    #[test]
    fn test_load_discards_garbage() {
        let slot = MemorySlot::shared();
        slot.set("k", b"not json").unwrap();
        let persistence = Persistence::new(slot, PersistencePolicy::Strict);
        assert_eq!(persistence.load::<Vec<i32>>("k"), None);
    }

    #[test]
    fn test_file_slot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("data"));
        assert!(slot.get("addresses-1").unwrap().is_none());
        slot.set("addresses-1", b"[]").unwrap();
        assert_eq!(slot.get("addresses-1").unwrap().as_deref(), Some(&b"[]"[..]));
        assert!(dir.path().join("data/addresses-1.json").exists());
    }

    #[test]
    fn test_file_slot_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path());
        slot.set("../escape", b"1").unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "strict".parse::<PersistencePolicy>().unwrap(),
            PersistencePolicy::Strict
        );
        assert!("sometimes".parse::<PersistencePolicy>().is_err());
    }
}
