//! Domain models for the storefront.
//!
//! Row types derive `sqlx::FromRow` and double as JSON response bodies
//! where the shapes match.

pub mod account;
pub mod cart;
pub mod item;
pub mod order;
pub mod session;

pub use account::{Account, Profile};
pub use cart::{CartLine, CartView};
pub use item::{Item, ItemUpdate, NewItem};
pub use order::{AdminOrderView, Order, OrderLine, OrderWithLines};
pub use session::{CurrentUser, keys as session_keys};
