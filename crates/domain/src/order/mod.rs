//! Order drafts, their value objects and pricing.

mod draft;
mod pricing;
mod value_objects;

pub use draft::{DEFAULT_PAYMENT_METHOD, OrderDraft, OrderStatus, OrderSummary};
pub use pricing::{Pricing, PricingPolicy};
pub use value_objects::{Money, OrderItem, ShippingAddress, TaxRate};
