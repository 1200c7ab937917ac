use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a string-backed identifier newtype.
///
/// Identifiers arrive from the orchestrator and the cart store as opaque
/// strings, so they are not parsed into UUIDs.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of an order (one checkout attempt as seen by the orchestrator).
    OrderId
);

string_id!(
    /// Identifier of the shopper, supplied by the auth layer.
    UserId
);

string_id!(
    /// Product identifier (catalog key).
    ProductId
);

string_id!(
    /// Caller-supplied token making a side-effecting request execute at most once.
    IdempotencyKey
);

string_id!(
    /// Groups every reservation record written by one reserve call.
    ReservationGroupId
);

/// 16 lowercase hex characters of fresh randomness.
fn random_suffix() -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(16);
    hex
}

impl OrderId {
    /// Generates a fresh order ID of the form `ORDER#<unix-millis>-<16 hex>`.
    pub fn generate() -> Self {
        Self(format!(
            "ORDER#{}-{}",
            Utc::now().timestamp_millis(),
            random_suffix()
        ))
    }
}

impl ReservationGroupId {
    /// Generates a reservation group ID scoped to an order.
    pub fn generate(order_id: &OrderId) -> Self {
        Self(format!("RESERVATION#{}#{}", order_id, random_suffix()))
    }
}

impl IdempotencyKey {
    /// Derives a key for a call that arrived without one.
    ///
    /// Derived keys are unique per call, so they never hit the cache; they only
    /// label the records the call writes.
    pub fn derived(order_id: &OrderId, operation: &str) -> Self {
        Self(format!(
            "{}-{}-{}",
            order_id,
            operation,
            Utc::now().timestamp_millis()
        ))
    }
}
