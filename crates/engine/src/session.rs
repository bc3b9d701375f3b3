//! Session context.
//!
//! A [`SessionContext`] owns every store for one browsing session plus the
//! collaborator handles. Stores are only reachable through it; there is no
//! process-wide state.
//!
//! Operations that call a collaborator follow one shape: validate and build
//! against the stores, make the remote call, then commit locally. A remote
//! failure therefore leaves the stores as they were.
//!
//! Refund resolution makes two remote calls. If the order update fails after
//! the gateway has stored the resolution, the request is committed and the
//! order is left for [`SessionContext::refresh_orders`] to bring in line with
//! its approved requests.

use chrono::Utc;
use marketstall_core::{
    Order, OrderId, OrderStatus, Product, ProductId, RefundId, RefundRequest, UserRole,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cart::CartStore;
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::checkout::{self, CheckoutSelection};
use crate::error::{CommerceError, EntityKind, Result};
use crate::orders::{Eligibility, OrderBook};
use crate::profile::ProfileStore;
use crate::refunds::RefundWorkflow;
use crate::services::{AuthProvider, CurrentUser, OrderService, RefundGateway};
use crate::storage::Persistence;

/// Handles to the external collaborators.
#[derive(Debug, Clone)]
pub struct Collaborators<A, C, O, R> {
    pub auth: A,
    pub catalog: C,
    pub orders: O,
    pub refunds: R,
}

/// Stores and collaborators for one browsing session.
pub struct SessionContext<A, C, O, R> {
    collaborators: Collaborators<A, C, O, R>,
    user: Option<CurrentUser>,
    cart: CartStore,
    profile: Option<ProfileStore>,
    orders: OrderBook,
    refunds: RefundWorkflow,
}

impl<A, C, O, R> SessionContext<A, C, O, R>
where
    A: AuthProvider,
    C: Catalog,
    O: OrderService,
    R: RefundGateway,
{
    /// Open a session.
    ///
    /// Reads the current user, lists the catalog, restores the cart and (when
    /// signed in) the profile, then fetches order history with refunds.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFailure` if the catalog listing or order history fetch
    /// fails.
    #[instrument(
        skip_all,
        fields(cart_key = tracing::field::Empty, user_id = tracing::field::Empty)
    )]
    pub async fn open(
        collaborators: Collaborators<A, C, O, R>,
        persistence: Persistence,
        cart_key: impl Into<String>,
    ) -> Result<Self> {
        let cart_key = cart_key.into();
        let span = tracing::Span::current();
        span.record("cart_key", cart_key.as_str());

        let user = collaborators.auth.current_user();
        if let Some(user) = user {
            span.record("user_id", user.id.as_i32());
        }

        let snapshot: CatalogSnapshot = collaborators
            .catalog
            .list()
            .await
            .inspect_err(|e| warn!(error = %e, "Catalog listing failed"))?
            .into_iter()
            .collect();

        let cart = CartStore::restore(persistence.clone(), cart_key, &snapshot);
        let profile = user.map(|u| ProfileStore::restore(&persistence, u.id));

        let mut session = Self {
            collaborators,
            user,
            cart,
            profile,
            orders: OrderBook::new(),
            refunds: RefundWorkflow::new(),
        };
        if session.user.is_some() {
            session.refresh_orders().await?;
        }

        info!(
            products = snapshot.len(),
            cart_lines = session.cart.lines().len(),
            orders = session.orders.len(),
            "Session opened"
        );
        Ok(session)
    }

    #[must_use]
    pub const fn user(&self) -> Option<CurrentUser> {
        self.user
    }

    #[must_use]
    pub const fn collaborators(&self) -> &Collaborators<A, C, O, R> {
        &self.collaborators
    }

    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn` for an anonymous session.
    pub fn profile(&self) -> Result<&ProfileStore> {
        self.profile.as_ref().ok_or(CommerceError::NotSignedIn)
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn` for an anonymous session.
    pub fn profile_mut(&mut self) -> Result<&mut ProfileStore> {
        self.profile.as_mut().ok_or(CommerceError::NotSignedIn)
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn` for an anonymous session.
    pub fn orders(&self) -> Result<&OrderBook> {
        self.require_user()?;
        Ok(&self.orders)
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn` for an anonymous session.
    pub fn refunds(&self) -> Result<&RefundWorkflow> {
        self.require_user()?;
        Ok(&self.refunds)
    }

    /// Mutable access for item selection.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` for an anonymous session.
    pub fn refunds_mut(&mut self) -> Result<&mut RefundWorkflow> {
        self.require_user()?;
        Ok(&mut self.refunds)
    }

    fn require_user(&self) -> Result<CurrentUser> {
        self.user.ok_or(CommerceError::NotSignedIn)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    async fn fetch_product(&self, product_id: ProductId) -> Result<Product> {
        self.collaborators
            .catalog
            .get(product_id)
            .await
            .inspect_err(|e| warn!(product_id = %product_id, error = %e, "Catalog read failed"))?
            .ok_or_else(|| CommerceError::not_found(EntityKind::Product, product_id))
    }

    /// Add units of a product, checked against its current stock.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the catalog does not know the product
    /// - anything [`CartStore::add_item`] returns
    #[instrument(skip(self))]
    pub async fn add_to_cart(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let product = self.fetch_product(product_id).await?;
        self.cart.add_item(&product, quantity)
    }

    /// [`SessionContext::add_to_cart`] guarded by an idempotency token.
    ///
    /// # Errors
    ///
    /// Same as [`SessionContext::add_to_cart`].
    #[instrument(skip(self))]
    pub async fn add_to_cart_once(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        token: Uuid,
    ) -> Result<u32> {
        let product = self.fetch_product(product_id).await?;
        self.cart.add_item_once(&product, quantity, token)
    }

    /// Set a line's quantity against current stock. Zero or below removes it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the catalog does not know the product or it is not in
    ///   the cart
    /// - anything [`CartStore::set_quantity_with`] returns
    #[instrument(skip(self))]
    pub async fn set_cart_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return self.cart.remove_item(product_id);
        }
        let product = self.fetch_product(product_id).await?;
        self.cart.set_quantity_with(&product, quantity)
    }

    /// # Errors
    ///
    /// Returns `RemoteFailure` if the slot write fails under the strict policy.
    pub fn remove_from_cart(&mut self, product_id: ProductId) -> Result<()> {
        self.cart.remove_item(product_id)
    }

    /// # Errors
    ///
    /// Returns `RemoteFailure` if the slot write fails under the strict policy.
    pub fn clear_cart(&mut self) -> Result<()> {
        self.cart.clear()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Place an order for the cart's contents.
    ///
    /// On success the order is recorded and the cart cleared. On failure
    /// the cart, profile and order book are unchanged.
    ///
    /// # Errors
    ///
    /// - `NotSignedIn` for an anonymous session
    /// - anything [`checkout::prepare`] returns
    /// - `RemoteFailure` if the order service rejects the order
    #[instrument(skip(self))]
    pub async fn checkout(&mut self, selection: CheckoutSelection) -> Result<Order> {
        let user = self.require_user()?;
        let plan = checkout::prepare(
            &self.collaborators.catalog,
            &self.cart,
            self.profile()?,
            selection,
        )
        .await?;

        let order = self
            .collaborators
            .orders
            .create(user.id, plan.items, plan.shipping_address, plan.payment_method)
            .await
            .inspect_err(|e| warn!(user_id = %user.id, error = %e, "Order placement failed"))?;

        self.orders.record(order.clone());
        if let Err(e) = self.cart.clear() {
            // The order exists remotely; a stale cart is recoverable
            warn!(order_id = %order.id, error = %e, "Cart not cleared after checkout");
        }

        info!(order_id = %order.id, total = %order.total, "Checkout complete");
        Ok(order)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Replace the order book and refund requests with the services' view.
    ///
    /// Customers see their own orders and admins see every order. Orders
    /// whose status lags their approved refund requests are then moved to
    /// `partially_refunded` or `refunded` through the order service.
    ///
    /// # Errors
    ///
    /// - `NotSignedIn` for an anonymous session
    /// - `RemoteFailure` if either listing fails; nothing is replaced
    #[instrument(skip(self))]
    pub async fn refresh_orders(&mut self) -> Result<()> {
        let user = self.require_user()?;
        let orders = match user.role {
            UserRole::Admin => self.collaborators.orders.list_all().await,
            UserRole::Customer => self.collaborators.orders.list_for_user(user.id).await,
        }
        .inspect_err(|e| warn!(error = %e, "Order history fetch failed"))?;
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let requests = self
            .collaborators
            .refunds
            .list_for_orders(&ids)
            .await
            .inspect_err(|e| warn!(error = %e, "Refund listing failed"))?;

        self.orders.replace_all(orders);
        self.refunds.replace_all(requests);
        self.reconcile_refund_statuses().await;
        Ok(())
    }

    /// A failed write is logged and left for the next refresh.
    async fn reconcile_refund_statuses(&mut self) {
        let now = Utc::now();
        let lagging: Vec<Order> = self
            .orders
            .orders()
            .iter()
            .filter_map(|order| {
                let target = self.refunds.lagging_refund_status(order)?;
                let mut order = order.clone();
                order.transition_to(target, now).ok()?;
                Some(order)
            })
            .collect();

        for order in lagging {
            match self.collaborators.orders.update(&order).await {
                Ok(()) => {
                    info!(
                        order_id = %order.id,
                        status = %order.status,
                        "Order refund status reconciled"
                    );
                    self.orders.record(order);
                }
                Err(e) => {
                    warn!(
                        order_id = %order.id,
                        error = %e,
                        "Order refund status not reconciled"
                    );
                }
            }
        }
    }

    /// Apply an observed fulfillment status to an order.
    ///
    /// # Errors
    ///
    /// - `NotSignedIn`, `NotFound` or `InvalidTransition`
    /// - `RemoteFailure` if the order service update fails
    #[instrument(skip(self))]
    pub async fn apply_fulfillment_update(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        self.require_user()?;
        let order =
            self.orders
                .prepare_fulfillment_update(order_id, status, tracking_number, Utc::now())?;
        self.collaborators
            .orders
            .update(&order)
            .await
            .inspect_err(|e| warn!(error = %e, "Order update failed"))?;
        self.orders.record(order.clone());

        info!(status = %order.status, "Order status updated");
        Ok(order)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// # Errors
    ///
    /// Returns `NotSignedIn` or `NotFound`.
    pub fn refund_eligibility(&self, order_id: OrderId) -> Result<Eligibility> {
        self.require_user()?;
        let order = self.orders.require(order_id)?;
        Ok(self.refunds.eligibility(order))
    }

    /// Submit a refund request for some of an order's items.
    ///
    /// # Errors
    ///
    /// - `NotSignedIn` or `NotFound`
    /// - anything [`RefundWorkflow::prepare`] returns
    /// - `RemoteFailure` if the gateway rejects the request
    #[instrument(skip(self, reason))]
    pub async fn request_refund(
        &mut self,
        order_id: OrderId,
        product_ids: &[ProductId],
        reason: &str,
    ) -> Result<RefundRequest> {
        self.require_user()?;
        let order = self.orders.require(order_id)?;
        let prepared = self.refunds.prepare(order, product_ids, reason, Utc::now())?;
        self.submit_prepared(prepared).await
    }

    /// Submit a refund request for the current item selection.
    ///
    /// # Errors
    ///
    /// Same as [`SessionContext::request_refund`].
    #[instrument(skip(self, reason))]
    pub async fn request_refund_for_selection(
        &mut self,
        order_id: OrderId,
        reason: &str,
    ) -> Result<RefundRequest> {
        self.require_user()?;
        let order = self.orders.require(order_id)?;
        let prepared = self.refunds.prepare_selection(order, reason, Utc::now())?;
        self.submit_prepared(prepared).await
    }

    async fn submit_prepared(&mut self, prepared: RefundRequest) -> Result<RefundRequest> {
        let stored = self
            .collaborators
            .refunds
            .submit(prepared)
            .await
            .inspect_err(|e| warn!(error = %e, "Refund submission failed"))?;
        Ok(self.refunds.commit(stored))
    }

    /// Approve or reject a pending request.
    ///
    /// An approval also moves the order to `partially_refunded` or `refunded`.
    ///
    /// # Errors
    ///
    /// - `NotSignedIn` or `NotFound`
    /// - anything [`RefundWorkflow::prepare_resolution`] returns
    /// - `RemoteFailure` if the gateway or order service update fails; after
    ///   a gateway success the resolution is kept and only the order lags
    #[instrument(skip(self))]
    pub async fn resolve_refund(
        &mut self,
        request_id: RefundId,
        approved: bool,
    ) -> Result<RefundRequest> {
        self.require_user()?;
        let order_id = self
            .refunds
            .get(request_id)
            .map(|r| r.order_id)
            .ok_or_else(|| CommerceError::not_found(EntityKind::Refund, request_id))?;
        let order = self.orders.require(order_id)?;
        let resolution = self
            .refunds
            .prepare_resolution(request_id, approved, order, Utc::now())?;

        self.collaborators
            .refunds
            .resolve(&resolution.request)
            .await
            .inspect_err(|e| warn!(error = %e, "Refund resolution failed"))?;
        let order_update = match &resolution.order {
            Some(order) => self.collaborators.orders.update(order).await,
            None => Ok(()),
        };

        // The gateway holds the resolution from here on
        let request = resolution.request.clone();
        let order = self.refunds.apply_resolution(resolution);
        match (order_update, order) {
            (Ok(()), Some(order)) => self.orders.record(order),
            (Ok(()), None) => {}
            (Err(e), _) => {
                warn!(
                    order_id = %order_id,
                    error = %e,
                    "Order update failed after refund resolution"
                );
                return Err(e.into());
            }
        }
        Ok(request)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use marketstall_core::{
        Address, NewAddress, NewPaymentMethod, OrderItem, PaymentDetails, PaymentMethod, Price,
        RefundStatus, UserId, UserRole,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::error::{RemoteError, ValidationError};
    use crate::orders::Ineligibility;
    use crate::services::{LocalOrderService, LocalRefundGateway, StaticAuth};
    use crate::storage::{MemorySlot, PersistencePolicy, keys};

    type LocalSession =
        SessionContext<StaticAuth, Arc<MemoryCatalog>, LocalOrderService, LocalRefundGateway>;

    struct UnavailableOrders;

    impl OrderService for UnavailableOrders {
        async fn create(
            &self,
            _user_id: UserId,
            _items: Vec<OrderItem>,
            _shipping_address: Address,
            _payment_method: PaymentMethod,
        ) -> std::result::Result<Order, RemoteError> {
            Err(RemoteError::service("orders", "unavailable"))
        }

        async fn list_for_user(
            &self,
            _user_id: UserId,
        ) -> std::result::Result<Vec<Order>, RemoteError> {
            Ok(Vec::new())
        }

        async fn list_all(&self) -> std::result::Result<Vec<Order>, RemoteError> {
            Ok(Vec::new())
        }

        async fn update(&self, _order: &Order) -> std::result::Result<(), RemoteError> {
            Err(RemoteError::service("orders", "unavailable"))
        }
    }

    /// Slot-backed order service whose updates can be switched off.
    struct FlakyOrders {
        inner: LocalOrderService,
        fail_updates: Arc<AtomicBool>,
    }

    impl OrderService for FlakyOrders {
        async fn create(
            &self,
            user_id: UserId,
            items: Vec<OrderItem>,
            shipping_address: Address,
            payment_method: PaymentMethod,
        ) -> std::result::Result<Order, RemoteError> {
            self.inner
                .create(user_id, items, shipping_address, payment_method)
                .await
        }

        async fn list_for_user(
            &self,
            user_id: UserId,
        ) -> std::result::Result<Vec<Order>, RemoteError> {
            self.inner.list_for_user(user_id).await
        }

        async fn list_all(&self) -> std::result::Result<Vec<Order>, RemoteError> {
            self.inner.list_all().await
        }

        async fn update(&self, order: &Order) -> std::result::Result<(), RemoteError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(RemoteError::service("orders", "down"));
            }
            self.inner.update(order).await
        }
    }

    fn product(id: i32, price: i64, stock: u32) -> Product {
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

    fn customer() -> StaticAuth {
        StaticAuth::signed_in(CurrentUser {
            id: UserId::new(1),
            role: UserRole::Customer,
        })
    }

    struct Fixture {
        slot: Arc<MemorySlot>,
        catalog: Arc<MemoryCatalog>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                slot: MemorySlot::shared(),
                catalog: Arc::new(MemoryCatalog::new(vec![product(1, 10, 2), product(2, 5, 10)])),
            }
        }

        fn persistence(&self) -> Persistence {
            Persistence::new(self.slot.clone(), PersistencePolicy::BestEffort)
        }

        async fn open(&self, auth: StaticAuth) -> LocalSession {
            let collaborators = Collaborators {
                auth,
                catalog: Arc::clone(&self.catalog),
                orders: LocalOrderService::new(self.slot.clone()),
                refunds: LocalRefundGateway::new(self.slot.clone()),
            };
            SessionContext::open(collaborators, self.persistence(), keys::CART)
                .await
                .unwrap()
        }
    }

    fn home() -> NewAddress {
        NewAddress {
            name: "Home".to_string(),
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            country: "US".to_string(),
            is_default: false,
        }
    }

    fn card() -> NewPaymentMethod {
        NewPaymentMethod {
            details: PaymentDetails::CreditCard {
                cardholder_name: "Jane Doe".to_string(),
                last_four: "4242".to_string(),
                expiry_month: 4,
                expiry_year: 2031,
            },
            is_default: false,
        }
    }

    async fn signed_in_with_profile(fixture: &Fixture) -> LocalSession {
        let mut session = fixture.open(customer()).await;
        let profile = session.profile_mut().unwrap();
        profile.addresses_mut().add(home()).unwrap();
        profile.payment_methods_mut().add(card()).unwrap();
        session
    }

    #[tokio::test]
    async fn test_anonymous_session() {
        let fixture = Fixture::new();
        let mut session = fixture.open(StaticAuth::anonymous()).await;

        session.add_to_cart(ProductId::new(1), 1).await.unwrap();
        assert_eq!(session.cart().count(), 1);

        assert!(matches!(session.profile(), Err(CommerceError::NotSignedIn)));
        assert!(matches!(session.orders(), Err(CommerceError::NotSignedIn)));
        assert!(matches!(
            session.checkout(CheckoutSelection::default()).await,
            Err(CommerceError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn test_cart_uses_current_stock() {
        let fixture = Fixture::new();
        let mut session = fixture.open(StaticAuth::anonymous()).await;

        session.add_to_cart(ProductId::new(1), 2).await.unwrap();
        fixture.catalog.set_stock(ProductId::new(1), 1);
        assert!(matches!(
            session.set_cart_quantity(ProductId::new(1), 2).await,
            Err(CommerceError::StockExceeded { available: 1, .. })
        ));
        session.set_cart_quantity(ProductId::new(1), 1).await.unwrap();
        assert_eq!(session.cart().count(), 1);

        assert!(matches!(
            session.add_to_cart(ProductId::new(42), 1).await,
            Err(CommerceError::NotFound {
                kind: EntityKind::Product,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cart_survives_reopen() {
        let fixture = Fixture::new();
        {
            let mut session = fixture.open(StaticAuth::anonymous()).await;
            session.add_to_cart(ProductId::new(2), 3).await.unwrap();
        }
        let session = fixture.open(StaticAuth::anonymous()).await;
        assert_eq!(session.cart().count(), 3);
    }

    #[tokio::test]
    async fn test_checkout_records_order_and_clears_cart() {
        let fixture = Fixture::new();
        let mut session = signed_in_with_profile(&fixture).await;
        session.add_to_cart(ProductId::new(1), 2).await.unwrap();
        session.add_to_cart(ProductId::new(2), 1).await.unwrap();

        let order = session.checkout(CheckoutSelection::default()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Decimal::from(25));
        assert_eq!(order.shipping_address.name, "Home");
        assert!(session.cart().is_empty());
        assert_eq!(session.orders().unwrap().orders()[0].id, order.id);

        // History comes back on the next session
        let again = fixture.open(customer()).await;
        assert_eq!(again.orders().unwrap().len(), 1);
        assert!(again.cart().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_failure_keeps_cart() {
        let fixture = Fixture::new();
        let collaborators = Collaborators {
            auth: customer(),
            catalog: Arc::clone(&fixture.catalog),
            orders: UnavailableOrders,
            refunds: LocalRefundGateway::new(fixture.slot.clone()),
        };
        let mut session = SessionContext::open(collaborators, fixture.persistence(), keys::CART)
            .await
            .unwrap();
        let profile = session.profile_mut().unwrap();
        profile.addresses_mut().add(home()).unwrap();
        profile.payment_methods_mut().add(card()).unwrap();
        session.add_to_cart(ProductId::new(2), 2).await.unwrap();

        let err = session.checkout(CheckoutSelection::default()).await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(session.cart().count(), 2);
        assert!(session.orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_needs_profile() {
        let fixture = Fixture::new();
        let mut session = fixture.open(customer()).await;
        session.add_to_cart(ProductId::new(2), 1).await.unwrap();
        assert!(matches!(
            session.checkout(CheckoutSelection::default()).await,
            Err(CommerceError::Validation(ValidationError::MissingShippingAddress))
        ));
        assert_eq!(session.cart().count(), 1);
    }

    #[tokio::test]
    async fn test_refund_flow() {
        let fixture = Fixture::new();
        let mut session = signed_in_with_profile(&fixture).await;
        session.add_to_cart(ProductId::new(1), 2).await.unwrap();
        session.add_to_cart(ProductId::new(2), 1).await.unwrap();
        let order = session.checkout(CheckoutSelection::default()).await.unwrap();

        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            session
                .apply_fulfillment_update(order.id, status, None)
                .await
                .unwrap();
        }

        let request = session
            .request_refund(order.id, &[ProductId::new(1)], "Arrived damaged")
            .await
            .unwrap();
        assert_eq!(request.amount, Decimal::from(20));
        assert_eq!(
            session.refund_eligibility(order.id).unwrap(),
            Eligibility::Ineligible(Ineligibility::PendingRequest(request.id))
        );

        let resolved = session.resolve_refund(request.id, true).await.unwrap();
        assert_eq!(resolved.status, RefundStatus::Approved);
        assert!(resolved.response_date.is_some());

        let stored = session.orders().unwrap().get(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::PartiallyRefunded);
        assert!(session.refund_eligibility(order.id).unwrap().is_eligible());

        // Both records survive a reopen
        let again = fixture.open(customer()).await;
        let order = again.orders().unwrap().get(order.id).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyRefunded);
        assert_eq!(again.refunds().unwrap().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_catches_order_up_with_approved_refund() {
        let fixture = Fixture::new();
        let fail_updates = Arc::new(AtomicBool::new(false));
        let collaborators = Collaborators {
            auth: customer(),
            catalog: Arc::clone(&fixture.catalog),
            orders: FlakyOrders {
                inner: LocalOrderService::new(fixture.slot.clone()),
                fail_updates: Arc::clone(&fail_updates),
            },
            refunds: LocalRefundGateway::new(fixture.slot.clone()),
        };
        let mut session = SessionContext::open(collaborators, fixture.persistence(), keys::CART)
            .await
            .unwrap();
        let profile = session.profile_mut().unwrap();
        profile.addresses_mut().add(home()).unwrap();
        profile.payment_methods_mut().add(card()).unwrap();
        session.add_to_cart(ProductId::new(1), 1).await.unwrap();
        session.add_to_cart(ProductId::new(2), 1).await.unwrap();
        let order = session.checkout(CheckoutSelection::default()).await.unwrap();
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            session
                .apply_fulfillment_update(order.id, status, None)
                .await
                .unwrap();
        }
        let request = session
            .request_refund(order.id, &[ProductId::new(2)], "Arrived damaged")
            .await
            .unwrap();

        fail_updates.store(true, Ordering::SeqCst);
        let err = session.resolve_refund(request.id, true).await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(
            session.refunds().unwrap().get(request.id).unwrap().status,
            RefundStatus::Approved
        );
        assert_eq!(
            session.orders().unwrap().get(order.id).unwrap().status,
            OrderStatus::Delivered
        );

        // Still down: the refresh keeps the order as listed
        session.refresh_orders().await.unwrap();
        assert_eq!(
            session.orders().unwrap().get(order.id).unwrap().status,
            OrderStatus::Delivered
        );

        fail_updates.store(false, Ordering::SeqCst);
        session.refresh_orders().await.unwrap();
        assert_eq!(
            session.orders().unwrap().get(order.id).unwrap().status,
            OrderStatus::PartiallyRefunded
        );
        let stored = LocalOrderService::new(fixture.slot.clone())
            .list_for_user(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(stored[0].status, OrderStatus::PartiallyRefunded);

        // The rest of the order can still be refunded
        let rest = session
            .request_refund(order.id, &[ProductId::new(1)], "Arrived damaged")
            .await
            .unwrap();
        session.resolve_refund(rest.id, true).await.unwrap();
        assert_eq!(
            session.orders().unwrap().get(order.id).unwrap().status,
            OrderStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_admin_sees_every_order() {
        let fixture = Fixture::new();
        let mut session = signed_in_with_profile(&fixture).await;
        session.add_to_cart(ProductId::new(2), 1).await.unwrap();
        let order = session.checkout(CheckoutSelection::default()).await.unwrap();

        let admin = StaticAuth::signed_in(CurrentUser {
            id: UserId::new(99),
            role: UserRole::Admin,
        });
        let admin_session = fixture.open(admin).await;
        assert_eq!(admin_session.orders().unwrap().ids(), vec![order.id]);

        let other = fixture
            .open(StaticAuth::signed_in(CurrentUser {
                id: UserId::new(2),
                role: UserRole::Customer,
            }))
            .await;
        assert!(other.orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refund_selection_flow() {
        let fixture = Fixture::new();
        let mut session = signed_in_with_profile(&fixture).await;
        session.add_to_cart(ProductId::new(2), 2).await.unwrap();
        let order = session.checkout(CheckoutSelection::default()).await.unwrap();

        let refunds = session.refunds_mut().unwrap();
        let selection = refunds.begin_selection(order.id);
        selection.toggle(ProductId::new(2));
        assert_eq!(selection.selected_amount(&order), Decimal::from(10));

        let request = session
            .request_refund_for_selection(order.id, "Not what I ordered")
            .await
            .unwrap();
        assert_eq!(request.amount, Decimal::from(10));
        assert!(session.refunds().unwrap().selection().is_none());

        // A second request waits for the first to be resolved
        assert!(matches!(
            session
                .request_refund(order.id, &[ProductId::new(2)], "Not what I ordered")
                .await,
            Err(CommerceError::Validation(ValidationError::NotEligible { .. }))
        ));

        // Approval needs a delivered order; the request stays pending
        assert!(matches!(
            session.resolve_refund(request.id, true).await,
            Err(CommerceError::InvalidTransition(_))
        ));
        assert!(session.refunds().unwrap().get(request.id).unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_refund_on_unknown_order() {
        let fixture = Fixture::new();
        let mut session = fixture.open(customer()).await;
        assert!(matches!(
            session
                .request_refund(OrderId::new(9), &[ProductId::new(1)], "Arrived damaged")
                .await,
            Err(CommerceError::NotFound {
                kind: EntityKind::Order,
                ..
            })
        ));
    }
}
