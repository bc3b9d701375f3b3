//! Catalog collaborator and snapshot types.
//!
//! The catalog is the source of truth for products. The engine reads it
//! through the [`Catalog`] trait and never writes to it. Whatever a call
//! returns is authoritative for the duration of one cart mutation.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use marketstall_core::{Product, ProductId};
use moka::future::Cache;
use tracing::debug;

use crate::error::RemoteError;

/// Read-only access to catalog products.
pub trait Catalog: Send + Sync {
    /// All products, with stock and price as of the call.
    fn list(&self) -> impl Future<Output = Result<Vec<Product>, RemoteError>> + Send;

    /// One product, or `None` if the catalog does not know it.
    fn get(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RemoteError>> + Send;
}

/// Products keyed by ID, as listed at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<ProductId, Product>,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Products ordered by ID.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Product> {
        let mut products: Vec<_> = self.products.values().collect();
        products.sort_by_key(|p| p.id);
        products
    }
}

impl FromIterator<Product> for CatalogSnapshot {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        Self {
            products: iter.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

// =============================================================================
// MemoryCatalog
// =============================================================================

/// Catalog held in memory, optionally loaded from a JSON file.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: RwLock::new(products),
        }
    }

    /// Load a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Storage` if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, RemoteError> {
        let bytes = std::fs::read(path).map_err(crate::storage::StorageError::from)?;
        let products: Vec<Product> =
            serde_json::from_slice(&bytes).map_err(crate::storage::StorageError::from)?;
        debug!(count = products.len(), path = %path.display(), "Loaded catalog file");
        Ok(Self::new(products))
    }

    /// Insert or replace a product.
    pub fn upsert(&self, product: Product) {
        if let Ok(mut products) = self.products.write() {
            match products.iter_mut().find(|p| p.id == product.id) {
                Some(existing) => *existing = product,
                None => products.push(product),
            }
        }
    }

    /// Change a product's stock, as a restock or another buyer would.
    pub fn set_stock(&self, id: ProductId, stock: u32) {
        if let Ok(mut products) = self.products.write()
            && let Some(product) = products.iter_mut().find(|p| p.id == id)
        {
            product.stock = stock;
        }
    }

    /// Drop a product from the catalog.
    pub fn remove(&self, id: ProductId) {
        if let Ok(mut products) = self.products.write() {
            products.retain(|p| p.id != id);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Product>>, RemoteError> {
        self.products
            .read()
            .map_err(|_| RemoteError::service("catalog", "catalog lock poisoned"))
    }
}

impl Catalog for MemoryCatalog {
    async fn list(&self) -> Result<Vec<Product>, RemoteError> {
        Ok(self.read()?.clone())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RemoteError> {
        Ok(self.read()?.iter().find(|p| p.id == id).cloned())
    }
}

impl<C: Catalog> Catalog for Arc<C> {
    fn list(&self) -> impl Future<Output = Result<Vec<Product>, RemoteError>> + Send {
        self.as_ref().list()
    }

    fn get(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RemoteError>> + Send {
        self.as_ref().get(id)
    }
}

// =============================================================================
// CachedCatalog
// =============================================================================

/// Catalog wrapper that caches the listing using `moka`.
///
/// `list()` is served from the cache within the TTL. `get()` always goes
/// to the inner catalog, since cart mutations need current stock.
pub struct CachedCatalog<C> {
    inner: C,
    listing: Cache<(), Arc<Vec<Product>>>,
}

impl<C: Catalog> CachedCatalog<C> {
    #[must_use]
    pub fn new(inner: C, capacity: u64, ttl: Duration) -> Self {
        let listing = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, listing }
    }

    /// Drop the cached listing.
    pub fn invalidate_all(&self) {
        self.listing.invalidate_all();
    }
}

impl<C: Catalog> Catalog for CachedCatalog<C> {
    async fn list(&self) -> Result<Vec<Product>, RemoteError> {
        if let Some(products) = self.listing.get(&()).await {
            debug!("Catalog listing served from cache");
            return Ok(products.as_ref().clone());
        }

        let products = self.inner.list().await?;
        self.listing.insert((), Arc::new(products.clone())).await;
        Ok(products)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RemoteError> {
        self.inner.get(id).await
    }
}
