//! Checkout, order history and refund commands.
//!
//! # Usage
//!
//! ```bash
//! ms-cli --user 1 checkout --address 2
//! ms-cli --user 1 orders list
//! ms-cli --user 1 orders update 1 delivered
//! ms-cli --user 1 refund submit 1 --item 3 --reason "Arrived damaged"
//! ms-cli --user 1 --admin refund approve 1
//! ```

use marketstall_core::{
    AddressId, Order, OrderId, OrderStatus, PaymentMethodId, ProductId, RefundId, RefundRequest,
    UserRole,
};
use marketstall_engine::{CheckoutSelection, Eligibility};
use tracing::info;

use super::{CommandError, LocalSession};

/// Place an order for the cart.
///
/// # Errors
///
/// Returns any checkout precondition failure or an order service error.
#[allow(clippy::print_stdout)]
pub async fn checkout(
    session: &mut LocalSession,
    address: Option<i32>,
    payment: Option<i32>,
) -> Result<(), CommandError> {
    let selection = CheckoutSelection {
        address_id: address.map(AddressId::new),
        payment_method_id: payment.map(PaymentMethodId::new),
    };
    let order = session.checkout(selection).await?;
    println!(
        "Placed order {} for {:.2} ({} item(s))",
        order.id,
        order.total,
        order.items.len()
    );
    println!("Ship to: {}", order.shipping_address.one_line());
    println!("Pay with: {}", order.payment_method.details.summary());
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn` for an anonymous session.
#[allow(clippy::print_stdout)]
pub fn list(session: &LocalSession) -> Result<(), CommandError> {
    let book = session.orders()?;
    if book.is_empty() {
        println!("No orders");
    }
    for order in book.orders() {
        print_order_line(order);
    }
    Ok(())
}

/// Print one order with its items and refund history.
///
/// # Errors
///
/// Returns `NotSignedIn` or `NotFound`.
#[allow(clippy::print_stdout)]
pub fn show(session: &LocalSession, id: i32) -> Result<(), CommandError> {
    let id = OrderId::new(id);
    let order = session.orders()?.require(id)?;
    let refunds = session.refunds()?;

    print_order_line(order);
    if let Some(tracking) = &order.tracking_number {
        println!("  tracking {tracking}");
    }
    let refunded = refunds.refunded_products(id);
    for item in &order.items {
        let note = if refunded.contains(&item.product_id) {
            " (refunded)"
        } else {
            ""
        };
        println!(
            "  {:>4}  {:<32} {:>3} x {}{note}",
            item.product_id, item.name, item.quantity, item.price
        );
    }
    for request in refunds.requests_for(id) {
        print_refund_line(request);
    }
    match session.refund_eligibility(id)? {
        Eligibility::Eligible => println!("  refund: eligible"),
        Eligibility::Ineligible(why) => println!("  refund: not eligible ({why})"),
    }
    Ok(())
}

/// Record a fulfillment status for an order.
///
/// # Errors
///
/// Returns `InvalidArgument` for an unknown status, or any error from the
/// transition or the order service.
#[allow(clippy::print_stdout)]
pub async fn update(
    session: &mut LocalSession,
    id: i32,
    status: &str,
    tracking_number: Option<String>,
) -> Result<(), CommandError> {
    let status: OrderStatus = status.parse().map_err(CommandError::InvalidArgument)?;
    let order = session
        .apply_fulfillment_update(OrderId::new(id), status, tracking_number)
        .await?;
    println!("Order {} is now {}", order.id, order.status);
    Ok(())
}

// =============================================================================
// Refunds
// =============================================================================

/// # Errors
///
/// Returns any refund precondition failure or a gateway error.
#[allow(clippy::print_stdout)]
pub async fn submit_refund(
    session: &mut LocalSession,
    order: i32,
    items: &[i32],
    reason: &str,
) -> Result<(), CommandError> {
    let product_ids: Vec<ProductId> = items.iter().copied().map(ProductId::new).collect();
    let request = session
        .request_refund(OrderId::new(order), &product_ids, reason)
        .await?;
    info!(refund_id = %request.id, order_id = %request.order_id, "Refund requested");
    println!(
        "Refund request {} submitted for {:.2}",
        request.id, request.amount
    );
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn` for an anonymous session.
#[allow(clippy::print_stdout)]
pub fn list_refunds(session: &LocalSession) -> Result<(), CommandError> {
    let requests = session.refunds()?.requests();
    if requests.is_empty() {
        println!("No refund requests");
    }
    for request in requests {
        print_refund_line(request);
    }
    Ok(())
}

/// Approve or reject a pending request. Requires the admin role.
///
/// # Errors
///
/// Returns `InvalidArgument` without the admin role, or any resolution
/// error.
#[allow(clippy::print_stdout)]
pub async fn resolve_refund(
    session: &mut LocalSession,
    id: i32,
    approved: bool,
) -> Result<(), CommandError> {
    if session.user().map(|u| u.role) != Some(UserRole::Admin) {
        return Err(CommandError::InvalidArgument(
            "resolving refunds requires --admin".to_string(),
        ));
    }

    let request = session.resolve_refund(RefundId::new(id), approved).await?;
    println!("Refund request {} {}", request.id, request.status);
    if let Some(order) = session.orders()?.get(request.order_id) {
        println!("Order {} is now {}", order.id, order.status);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_order_line(order: &Order) {
    println!(
        "{:>4}  {}  {:<18} {:>10.2}  {} item(s)",
        order.id,
        order.created_at.format("%Y-%m-%d %H:%M"),
        order.status.to_string(),
        order.total,
        order.items.len()
    );
}

#[allow(clippy::print_stdout)]
fn print_refund_line(request: &RefundRequest) {
    println!(
        "  refund {:>4}  order {}  {:<8} {:>10.2}  {}",
        request.id,
        request.order_id,
        request.status.to_string(),
        request.amount,
        request.reason
    );
}
