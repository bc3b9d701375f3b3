//! Slot-backed collaborators.
//!
//! These keep orders and refund requests in the durable key-value slot
//! so the engine can run without a hosted data service. Every write goes
//! straight to the slot; a failed write is a `RemoteError`.

use chrono::Utc;
use marketstall_core::{
    Address, Order, OrderId, OrderItem, OrderStatus, PaymentMethod, RefundId, RefundRequest,
    UserId, items_total,
};
use tracing::{debug, info};

use super::{AuthProvider, CurrentUser, OrderService, RefundGateway};
use crate::error::RemoteError;
use crate::storage::{SharedSlot, keys, load_json, store_json};

/// Auth collaborator with a fixed identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAuth {
    user: Option<CurrentUser>,
}

impl StaticAuth {
    #[must_use]
    pub const fn signed_in(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user: None }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user
    }
}

// =============================================================================
// LocalOrderService
// =============================================================================

/// Order service that keeps every order under the `orders` key.
#[derive(Clone)]
pub struct LocalOrderService {
    slot: SharedSlot,
}

impl LocalOrderService {
    #[must_use]
    pub fn new(slot: SharedSlot) -> Self {
        Self { slot }
    }

    fn load(&self) -> Result<Vec<Order>, RemoteError> {
        Ok(load_json(self.slot.as_ref(), keys::ORDERS)?.unwrap_or_default())
    }

    fn save(&self, orders: &[Order]) -> Result<(), RemoteError> {
        Ok(store_json(self.slot.as_ref(), keys::ORDERS, orders)?)
    }
}

impl OrderService for LocalOrderService {
    async fn create(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address: Address,
        payment_method: PaymentMethod,
    ) -> Result<Order, RemoteError> {
        let mut orders = self.load()?;
        let id = orders
            .iter()
            .map(|o| o.id)
            .max()
            .map_or(Some(OrderId::new(1)), OrderId::next)
            .ok_or_else(|| RemoteError::service("orders", "order IDs exhausted"))?;
        let now = Utc::now();

        let order = Order {
            id,
            user_id,
            total: items_total(&items),
            items,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            shipping_address,
            payment_method,
            tracking_number: None,
        };
        orders.push(order.clone());
        self.save(&orders)?;

        info!(order_id = %order.id, user_id = %user_id, total = %order.total, "Order placed");
        Ok(order)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RemoteError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|o| o.user_id == user_id)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RemoteError> {
        self.load()
    }

    async fn update(&self, order: &Order) -> Result<(), RemoteError> {
        let mut orders = self.load()?;
        let stored = orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or_else(|| {
                RemoteError::service("orders", format!("order {} not found", order.id))
            })?;
        stored.status = order.status;
        stored.tracking_number.clone_from(&order.tracking_number);
        stored.updated_at = order.updated_at;
        self.save(&orders)?;

        debug!(order_id = %order.id, status = %order.status, "Order updated");
        Ok(())
    }
}

// =============================================================================
// LocalRefundGateway
// =============================================================================

/// Refund gateway that keeps every request under the `refunds` key.
#[derive(Clone)]
pub struct LocalRefundGateway {
    slot: SharedSlot,
}

impl LocalRefundGateway {
    #[must_use]
    pub fn new(slot: SharedSlot) -> Self {
        Self { slot }
    }

    fn load(&self) -> Result<Vec<RefundRequest>, RemoteError> {
        Ok(load_json(self.slot.as_ref(), keys::REFUNDS)?.unwrap_or_default())
    }

    fn save(&self, requests: &[RefundRequest]) -> Result<(), RemoteError> {
        Ok(store_json(self.slot.as_ref(), keys::REFUNDS, requests)?)
    }
}

impl RefundGateway for LocalRefundGateway {
    async fn submit(&self, mut request: RefundRequest) -> Result<RefundRequest, RemoteError> {
        let mut requests = self.load()?;
        request.id = requests
            .iter()
            .map(|r| r.id)
            .max()
            .map_or(Some(RefundId::new(1)), RefundId::next)
            .ok_or_else(|| RemoteError::service("refunds", "refund IDs exhausted"))?;
        requests.push(request.clone());
        self.save(&requests)?;

        info!(
            refund_id = %request.id,
            order_id = %request.order_id,
            amount = %request.amount,
            "Refund requested"
        );
        Ok(request)
    }

    async fn resolve(&self, request: &RefundRequest) -> Result<(), RemoteError> {
        let mut requests = self.load()?;
        let stored = requests
            .iter_mut()
            .find(|r| r.id == request.id)
            .ok_or_else(|| {
                RemoteError::service("refunds", format!("refund request {} not found", request.id))
            })?;
        stored.status = request.status;
        stored.response_date = request.response_date;
        self.save(&requests)?;

        info!(refund_id = %request.id, status = %request.status, "Refund resolved");
        Ok(())
    }

    async fn list_for_orders(
        &self,
        order_ids: &[OrderId],
    ) -> Result<Vec<RefundRequest>, RemoteError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| order_ids.contains(&r.order_id))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use marketstall_core::{
        AddressId, NewAddress, PaymentDetails, PaymentMethodId, Price, ProductId, RefundStatus,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::MemorySlot;

    fn address() -> Address {
        Address::from_draft(AddressId::new(1), NewAddress::default())
    }

    fn payment() -> PaymentMethod {
        PaymentMethod {
            id: PaymentMethodId::new(1),
            details: PaymentDetails::CreditCard {
                cardholder_name: "Jane Doe".to_string(),
                last_four: "4242".to_string(),
                expiry_month: 1,
                expiry_year: 2030,
            },
            is_default: true,
        }
    }

    fn items() -> Vec<OrderItem> {
        vec![OrderItem {
            product_id: ProductId::new(1),
            name: "Mug".to_string(),
            price: Price::usd(Decimal::from(8)).unwrap(),
            quantity: 2,
            image: None,
        }]
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let service = LocalOrderService::new(Arc::new(MemorySlot::new()));
        let first = service
            .create(UserId::new(1), items(), address(), payment())
            .await
            .unwrap();
        let second = service
            .create(UserId::new(2), items(), address(), payment())
            .await
            .unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(first.total, Decimal::from(16));

        let mine = service.list_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(service.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_persists_status() {
        let service = LocalOrderService::new(Arc::new(MemorySlot::new()));
        let mut order = service
            .create(UserId::new(1), items(), address(), payment())
            .await
            .unwrap();
        order.status = OrderStatus::Processing;
        service.update(&order).await.unwrap();

        let stored = service.list_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(stored[0].status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_create_fails_when_ids_run_out() {
        let service = LocalOrderService::new(Arc::new(MemorySlot::new()));
        let mut order = service
            .create(UserId::new(1), items(), address(), payment())
            .await
            .unwrap();
        order.id = OrderId::new(i32::MAX);
        service.save(&[order]).unwrap();

        let result = service
            .create(UserId::new(1), items(), address(), payment())
            .await;
        assert!(matches!(result, Err(RemoteError::Service { .. })));
        assert_eq!(service.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_fails_on_read_only_slot() {
        let slot = Arc::new(MemorySlot::new());
        slot.set_read_only(true);
        let service = LocalOrderService::new(slot);
        let result = service
            .create(UserId::new(1), items(), address(), payment())
            .await;
        assert!(matches!(result, Err(RemoteError::Storage(_))));
    }

    #[tokio::test]
    async fn test_refund_gateway_roundtrip() {
        let gateway = LocalRefundGateway::new(Arc::new(MemorySlot::new()));
        let request = RefundRequest {
            id: RefundId::new(99),
            order_id: OrderId::new(3),
            reason: "Arrived damaged".to_string(),
            amount: Decimal::from(16),
            status: RefundStatus::Pending,
            request_date: Utc::now(),
            response_date: None,
            items: items(),
        };

        let mut stored = gateway.submit(request).await.unwrap();
        assert_eq!(stored.id, RefundId::new(1));

        stored.status = RefundStatus::Approved;
        stored.response_date = Some(Utc::now());
        gateway.resolve(&stored).await.unwrap();

        let listed = gateway.list_for_orders(&[OrderId::new(3)]).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, RefundStatus::Approved);
        assert!(gateway.list_for_orders(&[OrderId::new(4)]).await.unwrap().is_empty());
    }

    #[test]
    fn test_static_auth() {
        assert!(StaticAuth::anonymous().current_user().is_none());
        let user = CurrentUser {
            id: UserId::new(4),
            role: marketstall_core::UserRole::Customer,
        };
        assert_eq!(StaticAuth::signed_in(user).current_user(), Some(user));
    }
}
