//! Marketstall Engine - client-side commerce state.
//!
//! The engine owns the mutable state of a shopping session and enforces its
//! invariants before anything reaches a collaborator:
//!
//! - [`cart`] - Cart lines, bounded by catalog stock
//! - [`profile`] - Saved addresses and payment methods with a single default
//! - [`orders`] - Order book, lifecycle transitions and refund eligibility
//! - [`refunds`] - Refund submission, item selection and resolution
//! - [`checkout`] - Turning a cart and profile into an order
//! - [`session`] - The context that owns all of the above
//!
//! # Collaborators
//!
//! The catalog, order placement, refund persistence and auth are external.
//! They are reached through the traits in [`catalog`] and [`services`];
//! [`storage`] provides the durable key-value slot the stores write to.
//! Slot-backed and in-memory implementations ship with the crate so the
//! engine runs standalone.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod orders;
pub mod profile;
pub mod refunds;
pub mod services;
pub mod session;
pub mod storage;

pub use cart::{CartLine, CartStore};
pub use catalog::{CachedCatalog, Catalog, CatalogSnapshot, MemoryCatalog};
pub use checkout::{CheckoutPlan, CheckoutSelection};
pub use config::{ConfigError, EngineConfig};
pub use error::{CommerceError, EntityKind, RemoteError, Result, ValidationError};
pub use orders::{Eligibility, Ineligibility, OrderBook, refund_eligibility};
pub use profile::{EntryCollection, ProfileEntry, ProfileStore};
pub use refunds::{RefundSelection, RefundWorkflow, Resolution};
pub use services::{
    AuthProvider, CurrentUser, LocalOrderService, LocalRefundGateway, OrderService,
    RefundGateway, StaticAuth,
};
pub use session::{Collaborators, SessionContext};
pub use storage::{
    FileSlot, KeyValueSlot, MemorySlot, Persistence, PersistencePolicy, SharedSlot, StorageError,
};
