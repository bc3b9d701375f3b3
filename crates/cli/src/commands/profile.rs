//! Saved address and payment method commands.
//!
//! All of these need a signed-in user (`--user <id>`).
//!
//! # Usage
//!
//! ```bash
//! ms-cli --user 1 address add "Home" "1 Main St" Springfield IL 62701 --default
//! ms-cli --user 1 address list
//! ms-cli --user 1 payment add-card "Jane Doe" 4242 12 2030
//! ms-cli --user 1 payment default 2
//! ```

use marketstall_core::{AddressId, NewAddress, NewPaymentMethod, PaymentDetails, PaymentMethodId};
use tracing::info;

use super::{CommandError, LocalSession};

const fn marker(is_default: bool) -> &'static str {
    if is_default { "*" } else { " " }
}

// =============================================================================
// Addresses
// =============================================================================

/// # Errors
///
/// Returns `NotSignedIn` for an anonymous session.
#[allow(clippy::print_stdout)]
pub fn list_addresses(session: &LocalSession) -> Result<(), CommandError> {
    let addresses = session.profile()?.addresses();
    if addresses.is_empty() {
        println!("No saved addresses");
    }
    for a in addresses.entries() {
        println!("{} {:>4}  {:<20} {}", marker(a.is_default), a.id, a.name, a.one_line());
    }
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn` or a persistence failure.
#[allow(clippy::print_stdout)]
pub fn add_address(session: &mut LocalSession, draft: NewAddress) -> Result<(), CommandError> {
    let address = session.profile_mut()?.addresses_mut().add(draft)?;
    info!(address_id = %address.id, "Address saved");
    println!(
        "Saved address {}{}",
        address.id,
        if address.is_default { " (default)" } else { "" }
    );
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn`, `NotFound` or a persistence failure.
pub fn default_address(session: &mut LocalSession, id: i32) -> Result<(), CommandError> {
    session
        .profile_mut()?
        .addresses_mut()
        .set_default(AddressId::new(id))?;
    list_addresses(session)
}

/// # Errors
///
/// Returns `NotSignedIn`, `NotFound`, `DefaultDeletionForbidden` or a
/// persistence failure.
pub fn delete_address(session: &mut LocalSession, id: i32) -> Result<(), CommandError> {
    session
        .profile_mut()?
        .addresses_mut()
        .delete(AddressId::new(id))?;
    list_addresses(session)
}

// =============================================================================
// Payment methods
// =============================================================================

/// # Errors
///
/// Returns `NotSignedIn` for an anonymous session.
#[allow(clippy::print_stdout)]
pub fn list_payment_methods(session: &LocalSession) -> Result<(), CommandError> {
    let methods = session.profile()?.payment_methods();
    if methods.is_empty() {
        println!("No saved payment methods");
    }
    for m in methods.entries() {
        println!("{} {:>4}  {}", marker(m.is_default), m.id, m.details.summary());
    }
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn`, an invalid-details validation error or a
/// persistence failure.
#[allow(clippy::print_stdout)]
pub fn add_payment_method(
    session: &mut LocalSession,
    details: PaymentDetails,
    is_default: bool,
) -> Result<(), CommandError> {
    let draft = NewPaymentMethod {
        details,
        is_default,
    };
    let method = session.profile_mut()?.payment_methods_mut().add(draft)?;
    info!(payment_method_id = %method.id, kind = %method.details.kind(), "Payment method saved");
    println!("Saved {}", method.details.summary());
    Ok(())
}

/// # Errors
///
/// Returns `NotSignedIn`, `NotFound` or a persistence failure.
pub fn default_payment_method(session: &mut LocalSession, id: i32) -> Result<(), CommandError> {
    session
        .profile_mut()?
        .payment_methods_mut()
        .set_default(PaymentMethodId::new(id))?;
    list_payment_methods(session)
}

/// # Errors
///
/// Returns `NotSignedIn`, `NotFound`, `DefaultDeletionForbidden` or a
/// persistence failure.
pub fn delete_payment_method(session: &mut LocalSession, id: i32) -> Result<(), CommandError> {
    session
        .profile_mut()?
        .payment_methods_mut()
        .delete(PaymentMethodId::new(id))?;
    list_payment_methods(session)
}
