//! Domain layer for the checkout pipeline.
//!
//! This crate provides:
//! - Value objects (`Money`, `TaxRate`, `ShippingAddress`, `OrderItem`)
//! - Pricing policy and order totals
//! - The `OrderDraft` emitted to the orchestrator
//! - The read-only `InventoryValidator`
//! - The error taxonomy shared by every layer (`ErrorKind`)

pub mod error;
pub mod inventory;
pub mod order;

pub use error::{DomainError, ErrorKind};
pub use inventory::{
    FailureReason, InventoryValidator, RequestedItem, ValidatedItem, ValidationFailure,
    ValidationReport,
};
pub use order::{
    DEFAULT_PAYMENT_METHOD, Money, OrderDraft, OrderItem, OrderStatus, OrderSummary, Pricing,
    PricingPolicy, ShippingAddress, TaxRate,
};
