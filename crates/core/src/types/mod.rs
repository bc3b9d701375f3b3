//! Core types for Marketstall.
//!
//! This module provides type-safe wrappers and records for the commerce
//! domain: IDs, prices, catalog products, saved profile entries, orders
//! and refund requests.

pub mod address;
pub mod email;
pub mod id;
pub mod order;
pub mod payment;
pub mod price;
pub mod product;
pub mod refund;
pub mod status;

pub use address::{Address, AddressPatch, NewAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Order, OrderItem, StatusTransitionError, items_total};
pub use payment::{
    NewPaymentMethod, PaymentDetails, PaymentDetailsError, PaymentKind, PaymentMethod,
    PaymentMethodPatch,
};
pub use price::{CurrencyCode, Price, PriceError};
pub use product::{CLOTHING_CATEGORY, Product};
pub use refund::{MIN_REFUND_REASON_CHARS, RefundRequest};
pub use status::*;
