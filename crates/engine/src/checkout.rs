//! Checkout planning.
//!
//! A checkout plan is everything the order service needs to place an order:
//! frozen items priced from a fresh catalog read, plus the chosen shipping
//! address and payment method. Building a plan never mutates the cart or the
//! profile.

use marketstall_core::{Address, AddressId, OrderItem, PaymentMethod, PaymentMethodId, items_total};
use rust_decimal::Decimal;
use tracing::debug;

use crate::cart::CartStore;
use crate::catalog::Catalog;
use crate::error::{CommerceError, EntityKind, Result, ValidationError};
use crate::profile::ProfileStore;

/// Explicit profile choices for a checkout. `None` means the default entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutSelection {
    pub address_id: Option<AddressId>,
    pub payment_method_id: Option<PaymentMethodId>,
}

/// A validated checkout, ready for the order service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
}

impl CheckoutPlan {
    #[must_use]
    pub fn total(&self) -> Decimal {
        items_total(&self.items)
    }
}

/// Resolve the shipping address and payment method for a checkout.
///
/// # Errors
///
/// - `NotFound` if an explicit ID is not in the profile
/// - `Validation(MissingShippingAddress | MissingPaymentMethod)` if no ID was
///   given and the collection has no default
pub fn select_profile(
    profile: &ProfileStore,
    selection: CheckoutSelection,
) -> Result<(Address, PaymentMethod)> {
    let addresses = profile.addresses();
    let address = match selection.address_id {
        Some(id) => addresses
            .get(id)
            .ok_or_else(|| CommerceError::not_found(EntityKind::Address, id))?,
        None => addresses
            .default_entry()
            .ok_or(ValidationError::MissingShippingAddress)?,
    };

    let payment_methods = profile.payment_methods();
    let payment_method = match selection.payment_method_id {
        Some(id) => payment_methods
            .get(id)
            .ok_or_else(|| CommerceError::not_found(EntityKind::PaymentMethod, id))?,
        None => payment_methods
            .default_entry()
            .ok_or(ValidationError::MissingPaymentMethod)?,
    };

    Ok((address.clone(), payment_method.clone()))
}

/// Freeze the cart into order items, re-reading each product's stock.
///
/// # Errors
///
/// - `Validation(EmptyCart)` if the cart has no lines
/// - `NotFound` if the catalog no longer knows a product
/// - `StockExceeded` if current stock is below a line's quantity
/// - `RemoteFailure` if a catalog read fails
pub async fn snapshot_items<C: Catalog>(
    catalog: &C,
    cart: &CartStore,
) -> Result<Vec<OrderItem>> {
    if cart.is_empty() {
        return Err(ValidationError::EmptyCart.into());
    }

    let mut items = Vec::with_capacity(cart.lines().len());
    for line in cart.lines() {
        let id = line.product.id;
        let product = catalog
            .get(id)
            .await?
            .ok_or_else(|| CommerceError::not_found(EntityKind::Product, id))?;
        if line.quantity > product.stock {
            return Err(CommerceError::StockExceeded {
                product_id: id,
                requested: u64::from(line.quantity),
                available: product.stock,
            });
        }
        items.push(OrderItem::snapshot(&product, line.quantity));
    }
    Ok(items)
}

/// Build a checkout plan from the cart and profile.
///
/// # Errors
///
/// Any error from [`select_profile`] or [`snapshot_items`], checked in the
/// order: empty cart, address, payment method, stock.
pub async fn prepare<C: Catalog>(
    catalog: &C,
    cart: &CartStore,
    profile: &ProfileStore,
    selection: CheckoutSelection,
) -> Result<CheckoutPlan> {
    if cart.is_empty() {
        return Err(ValidationError::EmptyCart.into());
    }
    let (shipping_address, payment_method) = select_profile(profile, selection)?;
    let items = snapshot_items(catalog, cart).await?;

    debug!(
        items = items.len(),
        address_id = %shipping_address.id,
        payment_method_id = %payment_method.id,
        "Checkout plan ready"
    );
    Ok(CheckoutPlan {
        items,
        shipping_address,
        payment_method,
    })
}
