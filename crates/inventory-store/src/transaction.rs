//! Write items for atomic multi-record transactions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ReservationRecord;
use crate::{OrderId, ProductId};

/// Upper bound on writes in one transaction.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// Precondition on a product record for a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCondition {
    /// The product record must exist.
    Exists,
    /// The product record must exist and hold at least this many units.
    AtLeast(u32),
}

/// A single write inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactWriteItem {
    /// Adds `delta` (possibly negative) to a product's stock.
    AdjustStock {
        product_id: ProductId,
        delta: i64,
        condition: StockCondition,
    },
    /// Writes a new active reservation. Conditioned on there being no active
    /// or committed reservation for the same (order, product).
    PutReservation(ReservationRecord),
    /// Marks an active reservation released. Conditioned on the record
    /// existing and being active.
    ReleaseReservation {
        order_id: OrderId,
        product_id: ProductId,
        released_at: DateTime<Utc>,
    },
    /// Marks an active reservation committed. Conditioned on the record
    /// existing and being active.
    CommitReservation {
        order_id: OrderId,
        product_id: ProductId,
        committed_at: DateTime<Utc>,
    },
}

impl TransactWriteItem {
    /// Decrements stock by `quantity`, only if at least `quantity` units remain.
    pub fn decrement_stock(product_id: ProductId, quantity: u32) -> Self {
        TransactWriteItem::AdjustStock {
            product_id,
            delta: -i64::from(quantity),
            condition: StockCondition::AtLeast(quantity),
        }
    }

    /// Increments stock by `quantity`, only if the product still exists.
    pub fn increment_stock(product_id: ProductId, quantity: u32) -> Self {
        TransactWriteItem::AdjustStock {
            product_id,
            delta: i64::from(quantity),
            condition: StockCondition::Exists,
        }
    }

    pub fn put_reservation(record: ReservationRecord) -> Self {
        TransactWriteItem::PutReservation(record)
    }

    pub fn release_reservation(
        order_id: OrderId,
        product_id: ProductId,
        released_at: DateTime<Utc>,
    ) -> Self {
        TransactWriteItem::ReleaseReservation {
            order_id,
            product_id,
            released_at,
        }
    }

    pub fn commit_reservation(
        order_id: OrderId,
        product_id: ProductId,
        committed_at: DateTime<Utc>,
    ) -> Self {
        TransactWriteItem::CommitReservation {
            order_id,
            product_id,
            committed_at,
        }
    }

    /// Returns the record this write targets.
    pub fn target(&self) -> WriteTarget {
        match self {
            TransactWriteItem::AdjustStock { product_id, .. } => WriteTarget::Product {
                product_id: product_id.clone(),
            },
            TransactWriteItem::PutReservation(record) => WriteTarget::Reservation {
                order_id: record.order_id.clone(),
                product_id: record.product_id.clone(),
            },
            TransactWriteItem::ReleaseReservation {
                order_id,
                product_id,
                ..
            }
            | TransactWriteItem::CommitReservation {
                order_id,
                product_id,
                ..
            } => WriteTarget::Reservation {
                order_id: order_id.clone(),
                product_id: product_id.clone(),
            },
        }
    }
}

/// The record a write item addresses.
///
/// Ordered products first, then reservations, each by key. Stores lock rows
/// in this order so concurrent transactions never wait on each other in a
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteTarget {
    Product {
        product_id: ProductId,
    },
    Reservation {
        order_id: OrderId,
        product_id: ProductId,
    },
}

impl WriteTarget {
    /// Returns the product the target refers to.
    pub fn product_id(&self) -> &ProductId {
        match self {
            WriteTarget::Product { product_id } => product_id,
            WriteTarget::Reservation { product_id, .. } => product_id,
        }
    }
}

/// Why a write's condition did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailedCondition {
    /// The product record does not exist.
    ProductMissing,
    /// The product holds fewer units than required.
    InsufficientStock { requested: u32, available: u32 },
    /// An active or committed reservation already exists for the
    /// (order, product).
    ReservationHeld,
    /// No active reservation exists for the (order, product).
    ReservationNotActive,
}

/// A failed condition reported for one write of a cancelled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionFailure {
    /// Position of the write in the submitted transaction.
    pub index: usize,
    pub target: WriteTarget,
    pub condition: FailedCondition,
}

/// Checks a transaction request before it is applied.
///
/// Every write must address a distinct record, and the transaction must be
/// non-empty and within [`MAX_TRANSACTION_ITEMS`].
pub fn validate_transaction(items: &[TransactWriteItem]) -> Result<(), String> {
    if items.is_empty() {
        return Err("Cannot execute an empty transaction".to_string());
    }
    if items.len() > MAX_TRANSACTION_ITEMS {
        return Err(format!(
            "Transaction has {} writes, limit is {}",
            items.len(),
            MAX_TRANSACTION_ITEMS
        ));
    }

    let mut seen = HashSet::new();
    for item in items {
        if let TransactWriteItem::AdjustStock { delta: 0, .. } = item {
            return Err("Stock adjustment delta must be non-zero".to_string());
        }
        if let TransactWriteItem::PutReservation(record) = item
            && record.quantity == 0
        {
            return Err("Reservation quantity must be positive".to_string());
        }
        if !seen.insert(item.target()) {
            return Err(format!(
                "Multiple writes target the same record: {:?}",
                item.target()
            ));
        }
    }

    Ok(())
}
