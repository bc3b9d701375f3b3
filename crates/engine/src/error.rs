//! Unified error handling for the commerce engine.
//!
//! Every store and session operation returns `Result<T, CommerceError>`.
//! None of these errors is fatal: each leaves in-memory state as it was
//! before the call, so the caller can re-issue a corrected operation.

use core::fmt;

use marketstall_core::{
    OrderId, PaymentDetailsError, ProductId, RefundId, RefundStatus, StatusTransitionError,
};
use thiserror::Error;

use crate::orders::Ineligibility;
use crate::storage::StorageError;

/// Kind of entity an ID refers to, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    CartLine,
    Address,
    PaymentMethod,
    Order,
    Refund,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::CartLine => write!(f, "cart line"),
            Self::Address => write!(f, "address"),
            Self::PaymentMethod => write!(f, "payment method"),
            Self::Order => write!(f, "order"),
            Self::Refund => write!(f, "refund request"),
        }
    }
}

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// Requested cart quantity is above current stock.
    #[error("only {available} of product {product_id} in stock (requested {requested})")]
    StockExceeded {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },

    /// Attempt to delete the current default address or payment method.
    #[error("cannot delete default {kind} {id}; set another default first")]
    DefaultDeletionForbidden { kind: EntityKind, id: i32 },

    /// Input failed a precondition; nothing was created or changed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced ID is absent from its collection.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i32 },

    /// A collaborator call or durable write failed.
    #[error("remote failure: {0}")]
    RemoteFailure(#[from] RemoteError),

    /// Order lifecycle step not permitted.
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] StatusTransitionError),

    /// The refund request has already been approved or rejected.
    #[error("refund request {id} is already {status}")]
    RefundAlreadyResolved { id: RefundId, status: RefundStatus },

    /// Every ID of this kind is already taken.
    #[error("no {kind} IDs left to assign")]
    IdsExhausted { kind: EntityKind },

    /// Operation needs a signed-in user.
    #[error("no user is signed in")]
    NotSignedIn,
}

impl CommerceError {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<i32>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the error came from a collaborator and may succeed on retry.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteFailure(_))
    }
}

/// Precondition failures, each naming what was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("refund reason must be at least {min} characters (got {actual})")]
    ReasonTooShort { min: usize, actual: usize },

    #[error("no items selected for refund")]
    NoItemsSelected,

    #[error("product {product_id} is not part of order {order_id}")]
    ItemNotInOrder {
        order_id: OrderId,
        product_id: ProductId,
    },

    #[error("product {0} selected more than once")]
    DuplicateItem(ProductId),

    #[error("product {0} has already been refunded")]
    ItemAlreadyRefunded(ProductId),

    #[error("order {order_id} is not eligible for a refund: {reason}")]
    NotEligible {
        order_id: OrderId,
        reason: Ineligibility,
    },

    #[error("cart is empty")]
    EmptyCart,

    #[error("no shipping address available")]
    MissingShippingAddress,

    #[error("no payment method available")]
    MissingPaymentMethod,

    #[error("invalid payment details: {0}")]
    InvalidPaymentDetails(#[from] PaymentDetailsError),
}

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A collaborator reported an error.
    #[error("{service} request failed: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    /// The durable key-value slot failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RemoteError {
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: message.into(),
        }
    }
}

/// Result type alias for `CommerceError`.
pub type Result<T> = std::result::Result<T, CommerceError>;
