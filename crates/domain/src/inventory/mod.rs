//! Inventory validation ahead of checkout.

mod report;
mod validator;

pub use report::{FailureReason, RequestedItem, ValidatedItem, ValidationFailure, ValidationReport};
pub use validator::InventoryValidator;
