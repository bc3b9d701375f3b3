//! Catalog and cart commands.
//!
//! # Usage
//!
//! ```bash
//! ms-cli catalog list
//! ms-cli cart add 3 --quantity 2
//! ms-cli cart set 3 5
//! ms-cli cart remove 3
//! ms-cli cart show
//! ```

use marketstall_core::ProductId;
use marketstall_engine::{CartStore, Catalog, CatalogSnapshot};
use tracing::info;

use super::{CommandError, LocalSession};

/// Print every catalog product, sorted by ID.
///
/// # Errors
///
/// Returns an error if the catalog cannot be listed.
#[allow(clippy::print_stdout)]
pub async fn list_catalog(session: &LocalSession) -> Result<(), CommandError> {
    let snapshot: CatalogSnapshot = session
        .collaborators()
        .catalog
        .list()
        .await?
        .into_iter()
        .collect();

    if snapshot.is_empty() {
        println!("Catalog is empty");
        return Ok(());
    }
    for p in snapshot.sorted() {
        let stock = if p.stock == 0 {
            "out of stock".to_string()
        } else {
            format!("{} in stock", p.stock)
        };
        let size = if p.requires_size_selection() {
            ", pick a size"
        } else {
            ""
        };
        println!(
            "{:>4}  {:<32} {:>10}  {} ({}{size})",
            p.id, p.name, p.price, stock, p.category
        );
    }
    Ok(())
}

/// Print the cart lines and total.
pub fn show(session: &LocalSession) {
    print_cart(session.cart());
}

/// # Errors
///
/// Returns an error if the product is unknown or stock is insufficient.
#[allow(clippy::print_stdout)]
pub async fn add(
    session: &mut LocalSession,
    product: i32,
    quantity: u32,
) -> Result<(), CommandError> {
    let total = session.add_to_cart(ProductId::new(product), quantity).await?;
    info!(product_id = product, quantity = total, "Cart updated");
    println!("Product {product} now has {total} in the cart");
    Ok(())
}

/// # Errors
///
/// Returns an error if the line is missing or stock is insufficient.
pub async fn set(
    session: &mut LocalSession,
    product: i32,
    quantity: i64,
) -> Result<(), CommandError> {
    session
        .set_cart_quantity(ProductId::new(product), quantity)
        .await?;
    print_cart(session.cart());
    Ok(())
}

/// # Errors
///
/// Returns an error if the cart cannot be persisted.
pub fn remove(session: &mut LocalSession, product: i32) -> Result<(), CommandError> {
    session.remove_from_cart(ProductId::new(product))?;
    print_cart(session.cart());
    Ok(())
}

/// # Errors
///
/// Returns an error if the cart cannot be persisted.
#[allow(clippy::print_stdout)]
pub fn clear(session: &mut LocalSession) -> Result<(), CommandError> {
    session.clear_cart()?;
    println!("Cart cleared");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(cart: &CartStore) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in cart.lines() {
        println!(
            "{:>4}  {:<32} {:>3} x {:>10} = {:.2}",
            line.product.id,
            line.product.name,
            line.quantity,
            line.product.price,
            line.line_total()
        );
    }
    println!("{} item(s), total {:.2}", cart.count(), cart.total());
}
