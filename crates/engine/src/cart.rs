//! Cart store.
//!
//! The cart is a list of lines, one per product, each holding the product
//! snapshot it was last validated against and a positive quantity.
//!
//! # Invariants
//!
//! - At most one line per product ID
//! - Every line satisfies `0 < quantity <= product.stock` as of its snapshot
//! - A rejected mutation leaves the lines unchanged
//!
//! Every accepted mutation writes the full line set to the cart slot before
//! (strict policy) or alongside (best-effort policy) the in-memory commit.

use std::collections::HashSet;

use marketstall_core::{OrderItem, Product, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::CatalogSnapshot;
use crate::error::{CommerceError, EntityKind, Result, ValidationError};
use crate::storage::Persistence;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price.line_total(self.quantity)
    }
}

/// Cart lines for one browsing session.
#[derive(Debug)]
pub struct CartStore {
    lines: Vec<CartLine>,
    key: String,
    persistence: Persistence,
    applied_tokens: HashSet<Uuid>,
}

impl CartStore {
    /// Empty cart that persists under `key`.
    #[must_use]
    pub fn new(persistence: Persistence, key: impl Into<String>) -> Self {
        Self {
            lines: Vec::new(),
            key: key.into(),
            persistence,
            applied_tokens: HashSet::new(),
        }
    }

    /// Read the cart back from its slot.
    ///
    /// Lines whose product the catalog no longer lists, or that are out of
    /// stock, are dropped. Kept lines take the catalog's current snapshot and
    /// have their quantity clamped to current stock.
    pub fn restore(
        persistence: Persistence,
        key: impl Into<String>,
        catalog: &CatalogSnapshot,
    ) -> Self {
        let key = key.into();
        let stored: Vec<CartLine> = persistence.load(&key).unwrap_or_default();
        let stored_count = stored.len();

        let mut lines: Vec<CartLine> = Vec::with_capacity(stored_count);
        for line in stored {
            let Some(product) = catalog.get(line.product.id) else {
                continue;
            };
            if !product.in_stock() || line.quantity == 0 {
                continue;
            }
            if lines.iter().any(|l| l.product.id == product.id) {
                continue;
            }
            lines.push(CartLine {
                product: product.clone(),
                quantity: line.quantity.min(product.stock),
            });
        }

        if lines.len() != stored_count {
            info!(
                key = %key,
                stored = stored_count,
                kept = lines.len(),
                "Dropped stale cart lines on restore"
            );
        }

        Self {
            lines,
            key,
            persistence,
            applied_tokens: HashSet::new(),
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product.id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Σ price × quantity.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Σ quantity.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Frozen order items for the current lines.
    #[must_use]
    pub fn order_items(&self) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|l| OrderItem::snapshot(&l.product, l.quantity))
            .collect()
    }

    /// Add `quantity` units of `product`, returning the line's new quantity.
    ///
    /// The line's snapshot is replaced by `product`.
    ///
    /// # Errors
    ///
    /// - `Validation(InvalidQuantity)` if `quantity` is zero
    /// - `StockExceeded` if the resulting quantity is above `product.stock`
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<u32> {
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity.into());
        }

        let existing = self.line(product.id).map_or(0, |l| l.quantity);
        let requested = u64::from(existing) + u64::from(quantity);
        let new_quantity = match u32::try_from(requested) {
            Ok(q) if q <= product.stock => q,
            _ => {
                return Err(CommerceError::StockExceeded {
                    product_id: product.id,
                    requested,
                    available: product.stock,
                });
            }
        };

        let mut lines = self.lines.clone();
        match lines.iter_mut().find(|l| l.product.id == product.id) {
            Some(line) => {
                line.product = product.clone();
                line.quantity = new_quantity;
            }
            None => lines.push(CartLine {
                product: product.clone(),
                quantity: new_quantity,
            }),
        }
        self.commit(lines)?;

        debug!(product_id = %product.id, quantity = new_quantity, "Cart line added");
        Ok(new_quantity)
    }

    /// [`CartStore::add_item`] guarded by an idempotency token.
    ///
    /// A token that already succeeded in this session is a no-op returning
    /// the line's current quantity.
    ///
    /// # Errors
    ///
    /// Same as [`CartStore::add_item`]. A failed call does not consume the token.
    pub fn add_item_once(&mut self, product: &Product, quantity: u32, token: Uuid) -> Result<u32> {
        if self.applied_tokens.contains(&token) {
            debug!(token = %token, "Cart add already applied");
            return Ok(self.line(product.id).map_or(0, |l| l.quantity));
        }
        let quantity = self.add_item(product, quantity)?;
        self.applied_tokens.insert(token);
        Ok(quantity)
    }

    /// Replace a line's quantity, checking against its stored snapshot.
    ///
    /// A quantity of zero or below removes the line.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `quantity` is positive and the product is not in the cart
    /// - `StockExceeded` if `quantity` is above the snapshot's stock
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return self.remove_item(product_id);
        }
        let product = self
            .line(product_id)
            .map(|l| l.product.clone())
            .ok_or_else(|| CommerceError::not_found(EntityKind::CartLine, product_id))?;
        self.set_quantity_with(&product, quantity)
    }

    /// Replace a line's quantity, checking against a fresh `product` record
    /// which also becomes the line's snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`CartStore::set_quantity`].
    pub fn set_quantity_with(&mut self, product: &Product, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return self.remove_item(product.id);
        }
        let requested = quantity.unsigned_abs();
        let new_quantity = match u32::try_from(requested) {
            Ok(q) if q <= product.stock => q,
            _ => {
                return Err(CommerceError::StockExceeded {
                    product_id: product.id,
                    requested,
                    available: product.stock,
                });
            }
        };

        let mut lines = self.lines.clone();
        let line = lines
            .iter_mut()
            .find(|l| l.product.id == product.id)
            .ok_or_else(|| CommerceError::not_found(EntityKind::CartLine, product.id))?;
        line.product = product.clone();
        line.quantity = new_quantity;
        self.commit(lines)?;

        debug!(product_id = %product.id, quantity = new_quantity, "Cart line quantity set");
        Ok(())
    }

    /// Remove a product's line. Absent products are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFailure` if the slot write fails under the strict policy.
    pub fn remove_item(&mut self, product_id: ProductId) -> Result<()> {
        if self.line(product_id).is_none() {
            return Ok(());
        }
        let lines = self
            .lines
            .iter()
            .filter(|l| l.product.id != product_id)
            .cloned()
            .collect();
        self.commit(lines)?;

        debug!(product_id = %product_id, "Cart line removed");
        Ok(())
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFailure` if the slot write fails under the strict policy.
    pub fn clear(&mut self) -> Result<()> {
        self.commit(Vec::new())?;
        debug!("Cart cleared");
        Ok(())
    }

    fn commit(&mut self, lines: Vec<CartLine>) -> Result<()> {
        self.persistence.write(&self.key, &lines)?;
        self.lines = lines;
        Ok(())
    }
}
