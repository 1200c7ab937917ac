//! Storage layer for the checkout pipeline.
//!
//! Holds the three record families the reservation saga touches:
//! - product stock records (owned by the catalog, mutated only conditionally)
//! - reservation records, one per (order, product)
//! - idempotency records caching the result of a side-effecting call
//!
//! Multi-record mutations go through [`InventoryStore::transact_write`], which
//! applies every write or none of them.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;
pub mod transaction;

pub use common::{IdempotencyKey, OrderId, ProductId, ReservationGroupId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::ReservationQuery;
pub use record::{
    IdempotencyRecord, ProductRecord, ProductStatus, ReservationRecord, ReservationRecordBuilder,
    ReservationStatus,
};
pub use store::{InventoryStore, InventoryStoreExt};
pub use transaction::{
    ConditionFailure, FailedCondition, MAX_TRANSACTION_ITEMS, StockCondition, TransactWriteItem,
    WriteTarget,
};
