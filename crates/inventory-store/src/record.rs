use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{IdempotencyKey, OrderId, ProductId, ReservationGroupId, StoreError, UserId};

/// Whether a product can currently be sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

impl ProductStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown product status '{other}'"
            ))),
        }
    }
}

/// A product's stock record as held by the catalog.
///
/// `stock` is unsigned: the store rejects any decrement that would take it
/// below zero instead of clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price in cents.
    pub price_cents: i64,
    pub stock: u32,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Creates an active product record.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        price_cents: i64,
        stock: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price_cents,
            stock,
            status: ProductStatus::Active,
            updated_at: Utc::now(),
        }
    }

    /// Returns the same record with a different status.
    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the product is active.
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

/// Lifecycle of a reservation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[default]
    Active,
    /// The order went through; the units are sold and never returned.
    Committed,
    Released,
}

impl ReservationStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "committed" => Ok(ReservationStatus::Committed),
            "released" => Ok(ReservationStatus::Released),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// A hold of `quantity` units of one product for one order.
///
/// There is at most one record per (order, product). An active record is
/// settled exactly once, either committed or released. Records are never
/// deleted synchronously; settled records expire after `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub reservation_group_id: ReservationGroupId,
    pub user_id: UserId,
    pub product_name: String,
    /// Unit price in cents, as snapshotted when the order was validated.
    pub price_cents: i64,
    pub quantity: u32,
    pub status: ReservationStatus,
    /// Effective idempotency key of the reserve call that wrote this record.
    pub idempotency_key: IdempotencyKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl ReservationRecord {
    /// Creates a new reservation record builder.
    pub fn builder() -> ReservationRecordBuilder {
        ReservationRecordBuilder::default()
    }

    /// Returns true if the reservation still holds stock.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Returns true if the reservation was committed or released.
    pub fn is_settled(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the reservation's lifetime has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Builder for constructing reservation records.
#[derive(Debug, Default)]
pub struct ReservationRecordBuilder {
    order_id: Option<OrderId>,
    product_id: Option<ProductId>,
    reservation_group_id: Option<ReservationGroupId>,
    user_id: Option<UserId>,
    product_name: Option<String>,
    price_cents: i64,
    quantity: Option<u32>,
    idempotency_key: Option<IdempotencyKey>,
    created_at: Option<DateTime<Utc>>,
    ttl: Option<Duration>,
}

impl ReservationRecordBuilder {
    pub fn order_id(mut self, id: OrderId) -> Self {
        self.order_id = Some(id);
        self
    }

    pub fn product_id(mut self, id: ProductId) -> Self {
        self.product_id = Some(id);
        self
    }

    pub fn reservation_group_id(mut self, id: ReservationGroupId) -> Self {
        self.reservation_group_id = Some(id);
        self
    }

    /// Sets the owning user. Defaults to `unknown`.
    pub fn user_id(mut self, id: UserId) -> Self {
        self.user_id = Some(id);
        self
    }

    /// Sets the product name. Defaults to `Unknown`.
    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn price_cents(mut self, cents: i64) -> Self {
        self.price_cents = cents;
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Sets the reservation lifetime. Defaults to 24 hours.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Tries to build the record, returning None if a required field is missing.
    pub fn try_build(self) -> Option<ReservationRecord> {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let ttl = self.ttl.unwrap_or_else(|| Duration::hours(24));
        Some(ReservationRecord {
            order_id: self.order_id?,
            product_id: self.product_id?,
            reservation_group_id: self.reservation_group_id?,
            user_id: self.user_id.unwrap_or_else(|| UserId::new("unknown")),
            product_name: self.product_name.unwrap_or_else(|| "Unknown".to_string()),
            price_cents: self.price_cents,
            quantity: self.quantity?,
            status: ReservationStatus::Active,
            idempotency_key: self.idempotency_key?,
            created_at,
            expires_at: created_at + ttl,
            released_at: None,
            committed_at: None,
        })
    }

    /// Builds the record.
    ///
    /// # Panics
    ///
    /// Panics if order_id, product_id, reservation_group_id, quantity or
    /// idempotency_key are not set.
    pub fn build(self) -> ReservationRecord {
        self.try_build()
            .expect("order_id, product_id, reservation_group_id, quantity and idempotency_key are required")
    }
}

/// A cached result for an idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: IdempotencyKey,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a record that expires `ttl` from now.
    pub fn new(key: IdempotencyKey, result: serde_json::Value, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            idempotency_key: key,
            result,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Returns true if the record has expired at `now`. Expired records are
    /// treated as absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ReservationRecordBuilder {
        ReservationRecord::builder()
            .order_id(OrderId::new("o-1"))
            .product_id(ProductId::new("SKU-001"))
            .reservation_group_id(ReservationGroupId::new("RESERVATION#o-1#abc"))
            .quantity(2)
            .idempotency_key(IdempotencyKey::new("k-1"))
    }

    #[test]
    fn reservation_builder_defaults() {
        let created = Utc::now();
        let record = builder().created_at(created).build();

        assert_eq!(record.status, ReservationStatus::Active);
        assert_eq!(record.user_id.as_str(), "unknown");
        assert_eq!(record.product_name, "Unknown");
        assert_eq!(record.price_cents, 0);
        assert_eq!(record.expires_at, created + Duration::hours(24));
        assert!(record.released_at.is_none());
        assert!(record.committed_at.is_none());
        assert!(!record.is_settled());
    }

    #[test]
    fn reservation_builder_custom_ttl() {
        let created = Utc::now();
        let record = builder()
            .created_at(created)
            .ttl(Duration::minutes(15))
            .build();
        assert!(!record.is_expired_at(created + Duration::minutes(14)));
        assert!(record.is_expired_at(created + Duration::minutes(15)));
    }

    #[test]
    fn reservation_try_build_requires_quantity() {
        let result = ReservationRecord::builder()
            .order_id(OrderId::new("o-1"))
            .product_id(ProductId::new("SKU-001"))
            .try_build();
        assert!(result.is_none());
    }

    #[test]
    fn status_parsing() {
        assert_eq!(
            "inactive".parse::<ProductStatus>().unwrap(),
            ProductStatus::Inactive
        );
        assert_eq!(
            "released".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Released
        );
        assert_eq!(
            "committed".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Committed
        );
        assert!("archived".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ReservationStatus::Released).unwrap();
        assert_eq!(json, "\"released\"");
    }

    #[test]
    fn idempotency_record_expiry() {
        let record = IdempotencyRecord::new(
            IdempotencyKey::new("k"),
            serde_json::json!({"ok": true}),
            Duration::hours(1),
        );
        assert!(!record.is_expired_at(Utc::now()));
        assert!(record.is_expired_at(Utc::now() + Duration::hours(2)));
    }
}
