use chrono::{DateTime, Utc};

use crate::record::{ReservationRecord, ReservationStatus};
use crate::OrderId;

/// Builder for constructing reservation queries.
///
/// Allows filtering reservation records by order, status and expiry.
#[derive(Debug, Clone, Default)]
pub struct ReservationQuery {
    /// Filter by order.
    pub order_id: Option<OrderId>,

    /// Filter by status.
    pub status: Option<ReservationStatus>,

    /// Only records whose `expires_at` is at or before this instant.
    pub expired_at: Option<DateTime<Utc>>,

    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl ReservationQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the active reservations of one order.
    pub fn active_for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            status: Some(ReservationStatus::Active),
            ..Default::default()
        }
    }

    /// Creates a query for active reservations whose lifetime has passed.
    pub fn expired_active(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ReservationStatus::Active),
            expired_at: Some(now),
            ..Default::default()
        }
    }

    /// Filter by order.
    pub fn order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Filter by status.
    pub fn status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter to records expired at `at`.
    pub fn expired_at(mut self, at: DateTime<Utc>) -> Self {
        self.expired_at = Some(at);
        self
    }

    /// Set maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if a record satisfies every filter of the query.
    pub fn matches(&self, record: &ReservationRecord) -> bool {
        if let Some(ref order_id) = self.order_id
            && &record.order_id != order_id
        {
            return false;
        }
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(at) = self.expired_at
            && !record.is_expired_at(at)
        {
            return false;
        }
        true
    }
}
