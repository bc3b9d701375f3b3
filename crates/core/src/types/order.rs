//! Order records.
//!
//! An order freezes its items, shipping address and payment method at
//! creation. Later edits to the catalog or profile never reach it; only
//! the status (and tracking number) moves afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::id::{OrderId, ProductId, UserId};
use super::payment::PaymentMethod;
use super::price::Price;
use super::product::Product;
use super::status::OrderStatus;

/// Rejected status change.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("order cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// A frozen copy of one purchased product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl OrderItem {
    /// Snapshot `product` at `quantity`.
    #[must_use]
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            quantity,
            image: product.image.clone(),
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity)
    }
}

/// Exact Σ price × quantity over `items`.
#[must_use]
pub fn items_total<'a>(items: impl IntoIterator<Item = &'a OrderItem>) -> Decimal {
    items.into_iter().map(OrderItem::line_total).sum()
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl Order {
    /// The item for `product_id`, if the order contains it.
    #[must_use]
    pub fn item(&self, product_id: ProductId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    #[must_use]
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.item(product_id).is_some()
    }

    /// Move to `next` if the lifecycle allows it, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StatusTransitionError` if `status -> next` is not a legal step;
    /// the order is left untouched.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::address::NewAddress;
    use crate::types::id::{AddressId, PaymentMethodId};
    use crate::types::payment::PaymentDetails;

    fn item(id: i32, price: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: ProductId::new(id),
            name: format!("Item {id}"),
            price: Price::usd(Decimal::from(price)).unwrap(),
            quantity,
            image: None,
        }
    }

    fn order(status: OrderStatus) -> Order {
        let items = vec![item(1, 10, 2), item(2, 5, 1)];
        Order {
            id: OrderId::new(1),
            user_id: UserId::new(7),
            total: items_total(&items),
            items,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            shipping_address: Address::from_draft(AddressId::new(1), NewAddress::default()),
            payment_method: PaymentMethod {
                id: PaymentMethodId::new(1),
                details: PaymentDetails::BankTransfer {
                    account_name: "J Doe".to_string(),
                    bank_name: "First Bank".to_string(),
                    account_last_four: "1234".to_string(),
                },
                is_default: true,
            },
            tracking_number: None,
        }
    }

    #[test]
    fn test_items_total() {
        assert_eq!(order(OrderStatus::Pending).total, Decimal::from(25));
    }

    #[test]
    fn test_transition_rejected_leaves_order() {
        let mut order = order(OrderStatus::Canceled);
        let before = order.clone();
        let err = order
            .transition_to(OrderStatus::Processing, Utc::now())
            .unwrap_err();
        assert_eq!(err.from, OrderStatus::Canceled);
        assert_eq!(order, before);
    }

    #[test]
    fn test_contains_product() {
        let order = order(OrderStatus::Delivered);
        assert!(order.contains_product(ProductId::new(2)));
        assert!(!order.contains_product(ProductId::new(3)));
    }
}
