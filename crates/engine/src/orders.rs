//! Order book and refund eligibility.
//!
//! The order book holds the signed-in user's orders as last reported by the
//! order service. Status changes are validated against the order lifecycle
//! before they are recorded:
//!
//! ```text
//! pending -> processing -> shipped -> delivered -> refunded
//!    |           |                        |            ^
//!    +-----------+--> canceled            +--> partially_refunded
//! ```

use core::fmt;

use chrono::{DateTime, Utc};
use marketstall_core::{
    Order, OrderId, OrderStatus, RefundId, RefundRequest, StatusTransitionError,
};
use tracing::debug;

use crate::error::{CommerceError, EntityKind, Result};

/// Why an order cannot take a new refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Canceled,
    Refunded,
    PendingRequest(RefundId),
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => write!(f, "order was canceled"),
            Self::Refunded => write!(f, "order is fully refunded"),
            Self::PendingRequest(id) => write!(f, "refund request {id} is still pending"),
        }
    }
}

/// Result of a refund eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(Ineligibility),
}

impl Eligibility {
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Whether `order` can take a new refund request, given every request
/// raised against it so far.
///
/// Derived on every call; never cached.
pub fn refund_eligibility<'a>(
    order: &Order,
    requests: impl IntoIterator<Item = &'a RefundRequest>,
) -> Eligibility {
    match order.status {
        OrderStatus::Canceled => return Eligibility::Ineligible(Ineligibility::Canceled),
        OrderStatus::Refunded => return Eligibility::Ineligible(Ineligibility::Refunded),
        _ => {}
    }
    requests
        .into_iter()
        .find(|r| r.order_id == order.id && r.is_pending())
        .map_or(Eligibility::Eligible, |r| {
            Eligibility::Ineligible(Ineligibility::PendingRequest(r.id))
        })
}

/// The signed-in user's orders, newest first.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: Vec<Order>,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book with a fresh listing from the order service.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders;
        self.sort();
        debug!(count = self.orders.len(), "Order book replaced");
    }

    /// Insert an order, or replace the stored copy with the same ID.
    pub fn record(&mut self, order: Order) {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => {
                self.orders.push(order);
                self.sort();
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Like [`OrderBook::get`], as an error when absent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the book has no order `id`.
    pub fn require(&self, id: OrderId) -> Result<&Order> {
        self.get(id)
            .ok_or_else(|| CommerceError::not_found(EntityKind::Order, id))
    }

    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    #[must_use]
    pub fn ids(&self) -> Vec<OrderId> {
        self.orders.iter().map(|o| o.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Copy of order `id` moved to `next`. The book is not changed.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the book has no order `id`
    /// - `InvalidTransition` if the lifecycle forbids the step
    pub fn prepare_transition(
        &self,
        id: OrderId,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let mut order = self.require(id)?.clone();
        order.transition_to(next, at)?;
        Ok(order)
    }

    /// Copy of order `id` with a fulfillment status applied.
    ///
    /// Only `processing`, `shipped`, `delivered` and `canceled` arrive this
    /// way; refund outcomes come from refund approval.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the book has no order `id`
    /// - `InvalidTransition` for refund statuses or illegal steps
    pub fn prepare_fulfillment_update(
        &self,
        id: OrderId,
        status: OrderStatus,
        tracking_number: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let current = self.require(id)?;
        if !is_fulfillment_status(status) {
            return Err(StatusTransitionError {
                from: current.status,
                to: status,
            }
            .into());
        }
        let mut order = self.prepare_transition(id, status, at)?;
        if tracking_number.is_some() {
            order.tracking_number = tracking_number;
        }
        Ok(order)
    }

    /// Apply a fulfillment status to the stored order.
    ///
    /// # Errors
    ///
    /// Same as [`OrderBook::prepare_fulfillment_update`]; the book is left
    /// unchanged on error.
    pub fn apply_fulfillment_update(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<&Order> {
        let order = self.prepare_fulfillment_update(id, status, tracking_number, Utc::now())?;
        self.record(order);
        self.require(id)
    }

    fn sort(&mut self) {
        self.orders
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    }
}

const fn is_fulfillment_status(status: OrderStatus) -> bool {
    !matches!(status, OrderStatus::Pending) && !status.is_refund_outcome()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use chrono::Duration;
    use marketstall_core::{
        Address, AddressId, NewAddress, OrderItem, PaymentDetails, PaymentMethod,
        PaymentMethodId, Price, ProductId, RefundStatus, UserId, items_total,
    };
    use rust_decimal::Decimal;

    use super::*;

    pub(crate) fn item(id: i32, price: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Price::usd(Decimal::from(price)).unwrap(),
            quantity,
            image: None,
        }
    }

    pub(crate) fn order(id: i32, status: OrderStatus, items: Vec<OrderItem>) -> Order {
        let created_at = Utc::now() + Duration::seconds(i64::from(id));
        Order {
            id: OrderId::new(id),
            user_id: UserId::new(1),
            total: items_total(&items),
            items,
            status,
            created_at,
            updated_at: created_at,
            shipping_address: Address::from_draft(AddressId::new(1), NewAddress::default()),
            payment_method: PaymentMethod {
                id: PaymentMethodId::new(1),
                details: PaymentDetails::CreditCard {
                    cardholder_name: "Jane Doe".to_string(),
                    last_four: "4242".to_string(),
                    expiry_month: 1,
                    expiry_year: 2030,
                },
                is_default: true,
            },
            tracking_number: None,
        }
    }

    fn request(id: i32, order_id: i32, status: RefundStatus) -> RefundRequest {
        RefundRequest {
            id: RefundId::new(id),
            order_id: OrderId::new(order_id),
            reason: "Arrived damaged".to_string(),
            amount: Decimal::from(10),
            status,
            request_date: Utc::now(),
            response_date: None,
            items: vec![item(1, 10, 1)],
        }
    }

    #[test]
    fn test_eligibility() {
        let delivered = order(1, OrderStatus::Delivered, vec![item(1, 10, 1)]);
        assert!(refund_eligibility(&delivered, &[]).is_eligible());

        let pending = [request(7, 1, RefundStatus::Pending)];
        assert_eq!(
            refund_eligibility(&delivered, &pending),
            Eligibility::Ineligible(Ineligibility::PendingRequest(RefundId::new(7)))
        );

        // Requests on other orders do not count
        let other = [request(8, 2, RefundStatus::Pending)];
        assert!(refund_eligibility(&delivered, &other).is_eligible());

        let rejected = [request(9, 1, RefundStatus::Rejected)];
        assert!(refund_eligibility(&delivered, &rejected).is_eligible());

        let canceled = order(3, OrderStatus::Canceled, vec![item(1, 10, 1)]);
        assert_eq!(
            refund_eligibility(&canceled, &[]),
            Eligibility::Ineligible(Ineligibility::Canceled)
        );
    }

    #[test]
    fn test_orders_newest_first() {
        let mut book = OrderBook::new();
        book.replace_all(vec![
            order(1, OrderStatus::Pending, vec![]),
            order(3, OrderStatus::Pending, vec![]),
            order(2, OrderStatus::Pending, vec![]),
        ]);
        let ids: Vec<_> = book.orders().iter().map(|o| o.id.as_i32()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        book.record(order(4, OrderStatus::Pending, vec![]));
        assert_eq!(book.orders()[0].id, OrderId::new(4));
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn test_fulfillment_updates() {
        let mut book = OrderBook::new();
        book.record(order(1, OrderStatus::Pending, vec![item(1, 10, 1)]));
        let id = OrderId::new(1);

        book.apply_fulfillment_update(id, OrderStatus::Processing, None)
            .unwrap();
        let shipped = book
            .apply_fulfillment_update(id, OrderStatus::Shipped, Some("1Z999".to_string()))
            .unwrap();
        assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));

        // Cannot cancel once shipped
        assert!(matches!(
            book.apply_fulfillment_update(id, OrderStatus::Canceled, None),
            Err(CommerceError::InvalidTransition(_))
        ));

        book.apply_fulfillment_update(id, OrderStatus::Delivered, None)
            .unwrap();
        assert!(matches!(
            book.apply_fulfillment_update(id, OrderStatus::Refunded, None),
            Err(CommerceError::InvalidTransition(StatusTransitionError {
                from: OrderStatus::Delivered,
                to: OrderStatus::Refunded
            }))
        ));
        assert_eq!(book.get(id).unwrap().status, OrderStatus::Delivered);
        assert_eq!(book.get(id).unwrap().tracking_number.as_deref(), Some("1Z999"));
    }

    #[test]
    fn test_nothing_leaves_canceled() {
        let mut book = OrderBook::new();
        book.record(order(1, OrderStatus::Canceled, vec![]));
        for next in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(book.apply_fulfillment_update(OrderId::new(1), next, None).is_err());
        }
    }

    #[test]
    fn test_unknown_order() {
        let mut book = OrderBook::new();
        assert!(matches!(
            book.apply_fulfillment_update(OrderId::new(5), OrderStatus::Shipped, None),
            Err(CommerceError::NotFound {
                kind: EntityKind::Order,
                id: 5
            })
        ));
    }
}
