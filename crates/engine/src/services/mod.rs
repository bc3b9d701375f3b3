//! External collaborators the engine consumes.
//!
//! # Architecture
//!
//! - Auth is read-only: the engine never authenticates, it only reads the
//!   current identity to scope profile and order queries
//! - Admin identities see every user's orders; customers see their own
//! - Order placement and refund persistence are remote and `async`
//! - No retries happen in this layer; a failed call surfaces once
//!
//! [`local`] provides slot-backed implementations used by the CLI and tests.

pub mod local;

use std::future::Future;

use marketstall_core::{
    Address, Order, OrderId, OrderItem, PaymentMethod, RefundRequest, UserId, UserRole,
};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

pub use local::{LocalOrderService, LocalRefundGateway, StaticAuth};

/// Identity reported by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: UserRole,
}

/// Read access to the signed-in identity.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// Order placement and history.
pub trait OrderService: Send + Sync {
    /// Place an order. The returned order has status `pending`.
    fn create(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address: Address,
        payment_method: PaymentMethod,
    ) -> impl Future<Output = Result<Order, RemoteError>> + Send;

    /// All orders placed by `user_id`.
    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Order>, RemoteError>> + Send;

    /// Every order from every user, for administrative sessions.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Order>, RemoteError>> + Send;

    /// Persist a status or tracking change on an existing order.
    fn update(&self, order: &Order) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Refund request persistence.
pub trait RefundGateway: Send + Sync {
    /// Store a new pending request, returning the stored record.
    ///
    /// The gateway may replace the provisional ID with its own.
    fn submit(
        &self,
        request: RefundRequest,
    ) -> impl Future<Output = Result<RefundRequest, RemoteError>> + Send;

    /// Store an approval or rejection.
    fn resolve(
        &self,
        request: &RefundRequest,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// All requests raised against `order_ids`.
    fn list_for_orders(
        &self,
        order_ids: &[OrderId],
    ) -> impl Future<Output = Result<Vec<RefundRequest>, RemoteError>> + Send;
}
