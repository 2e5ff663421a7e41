//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `cart` - Persistent cart with advisory stock checks
//! - `checkout` - The atomic checkout engine and its storage seam

pub mod auth;
pub mod cart;
pub mod checkout;

pub use auth::{AuthError, AuthService};
pub use cart::{CartError, CartService, CartStore, CartUpdate};
pub use checkout::{CheckoutEngine, CheckoutError, CheckoutLine, Receipt};
