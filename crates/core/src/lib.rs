//! EC Space Core - Shared types library.
//!
//! This crate provides common types used across all EC Space components:
//! - `storefront` - The storefront HTTP service (catalog, cart, checkout)
//! - `cli` - Command-line tools for migrations, seeding, and account management
//! - `integration-tests` - Cross-crate test suites
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, credits, quantities, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
