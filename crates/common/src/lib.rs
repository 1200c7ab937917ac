//! Shared identifier types used across the checkout pipeline crates.

pub mod types;

pub use types::{IdempotencyKey, OrderId, ProductId, ReservationGroupId, UserId};
