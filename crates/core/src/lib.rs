//! Marketstall Core - Shared types library.
//!
//! This crate provides the types used across all Marketstall components:
//! - `engine` - Client-side commerce state engine (cart, profile, orders, refunds)
//! - `cli` - Local driver for exercising the engine
//!
//! # Architecture
//!
//! The core crate contains only types and their invariants - no I/O, no
//! persistence, no collaborators. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, emails, statuses and domain records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
