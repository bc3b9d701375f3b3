//! Integration tests for Marketstall.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketstall-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Cart to order, across session reopen
//! - `refund_flow` - Fulfillment, refund submission and resolution
//! - `persistence` - File slot durability and write-failure policies
//!
//! Everything runs in-process against the slot-backed collaborators; no
//! external services are needed.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use marketstall_core::{
    NewAddress, NewPaymentMethod, OrderId, OrderStatus, PaymentDetails, Price, Product,
    ProductId, RefundRequest, UserId, UserRole,
};
use marketstall_engine::{
    Collaborators, CurrentUser, LocalOrderService, LocalRefundGateway, MemoryCatalog,
    MemorySlot, Persistence, PersistencePolicy, RefundGateway, RemoteError, Result,
    SessionContext, SharedSlot, StaticAuth,
};
use rust_decimal::Decimal;

/// Session over a memory catalog and the slot-backed collaborators.
pub type TestSession<R = LocalRefundGateway> =
    SessionContext<StaticAuth, Arc<MemoryCatalog>, LocalOrderService, R>;

// ============================================================================
// Fixtures
// ============================================================================

#[must_use]
pub fn product(id: i32, price: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Price::usd(Decimal::from(price)).unwrap(),
        stock,
        category: "kitchen".to_string(),
        subcategory: None,
        image: None,
    }
}

/// Catalog used by most flows: a scarce item, a plentiful one and an
/// out-of-stock one.
#[must_use]
pub fn default_products() -> Vec<Product> {
    vec![product(1, 10, 2), product(2, 5, 10), product(3, 40, 0)]
}

#[must_use]
pub fn address(name: &str, is_default: bool) -> NewAddress {
    NewAddress {
        name: name.to_string(),
        street: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip_code: "62701".to_string(),
        country: "US".to_string(),
        is_default,
    }
}

#[must_use]
pub fn card(last_four: &str) -> NewPaymentMethod {
    NewPaymentMethod {
        details: PaymentDetails::CreditCard {
            cardholder_name: "Jane Doe".to_string(),
            last_four: last_four.to_string(),
            expiry_month: 12,
            expiry_year: 2030,
        },
        is_default: false,
    }
}

#[must_use]
pub const fn customer(id: i32) -> StaticAuth {
    StaticAuth::signed_in(CurrentUser {
        id: UserId::new(id),
        role: UserRole::Customer,
    })
}

#[must_use]
pub const fn admin(id: i32) -> StaticAuth {
    StaticAuth::signed_in(CurrentUser {
        id: UserId::new(id),
        role: UserRole::Admin,
    })
}

// ============================================================================
// Harness
// ============================================================================

/// Shared slot and catalog that outlive individual sessions, so a test can
/// close a session and reopen it over the same durable state.
pub struct Harness {
    pub slot: SharedSlot,
    pub catalog: Arc<MemoryCatalog>,
}

impl Harness {
    /// Harness over a fresh memory slot.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self::with_slot(MemorySlot::shared(), products)
    }

    #[must_use]
    pub fn with_slot(slot: SharedSlot, products: Vec<Product>) -> Self {
        Self {
            slot,
            catalog: Arc::new(MemoryCatalog::new(products)),
        }
    }

    #[must_use]
    pub fn persistence(&self, policy: PersistencePolicy) -> Persistence {
        Persistence::new(Arc::clone(&self.slot), policy)
    }

    /// Open a best-effort session with the slot-backed refund gateway.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::open`] returns.
    pub async fn open(&self, auth: StaticAuth) -> Result<TestSession> {
        let refunds = LocalRefundGateway::new(Arc::clone(&self.slot));
        self.open_with(auth, refunds, PersistencePolicy::BestEffort)
            .await
    }

    /// Open a session with an explicit refund gateway and policy.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::open`] returns.
    pub async fn open_with<R: RefundGateway>(
        &self,
        auth: StaticAuth,
        refunds: R,
        policy: PersistencePolicy,
    ) -> Result<TestSession<R>> {
        let collaborators = Collaborators {
            auth,
            catalog: Arc::clone(&self.catalog),
            orders: LocalOrderService::new(Arc::clone(&self.slot)),
            refunds,
        };
        SessionContext::open(collaborators, self.persistence(policy), "cart").await
    }
}

/// Walk an order from `pending` through to `delivered`.
///
/// # Errors
///
/// Returns the first failed fulfillment update.
pub async fn deliver<R: RefundGateway>(session: &mut TestSession<R>, id: OrderId) -> Result<()> {
    for status in [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        session.apply_fulfillment_update(id, status, None).await?;
    }
    Ok(())
}

// ============================================================================
// Failing collaborators
// ============================================================================

/// Refund gateway that lists nothing and rejects every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingRefundGateway;

impl RefundGateway for FailingRefundGateway {
    async fn submit(
        &self,
        _request: RefundRequest,
    ) -> std::result::Result<RefundRequest, RemoteError> {
        Err(RemoteError::service("refunds", "gateway unavailable"))
    }

    async fn resolve(&self, _request: &RefundRequest) -> std::result::Result<(), RemoteError> {
        Err(RemoteError::service("refunds", "gateway unavailable"))
    }

    async fn list_for_orders(
        &self,
        _order_ids: &[OrderId],
    ) -> std::result::Result<Vec<RefundRequest>, RemoteError> {
        Ok(Vec::new())
    }
}
