//! Catalog product records.
//!
//! Products are owned by the catalog collaborator. The engine only ever
//! holds snapshots of them.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Category whose products need a size chosen before they reach the cart.
pub const CLOTHING_CATEGORY: &str = "clothing";

/// A product as reported by the catalog at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// Units available when the record was read.
    pub stock: u32,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Primary image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Product {
    /// Whether the caller must fold a size into the product identity
    /// before adding it to a cart.
    #[must_use]
    pub fn requires_size_selection(&self) -> bool {
        self.category.eq_ignore_ascii_case(CLOTHING_CATEGORY)
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
