//! Checkout initiation and the inventory steps of the order saga.
//!
//! Every step is a stateless unit of work over an injected
//! [`InventoryStore`](inventory_store::InventoryStore):
//! - [`CheckoutInitiator`] turns a cart into a priced order draft
//! - [`InventoryCheck`] re-validates an order's items
//! - [`ReservationCoordinator`] reserves stock all-or-nothing
//! - [`CommitCoordinator`] settles the reservations of a completed order
//! - [`ReleaseCoordinator`] returns reserved stock and never fails
//! - [`ExpirySweeper`] releases reservations nobody came back for

pub mod check;
pub mod checkout;
pub mod commit;
pub mod error;
pub mod idempotency;
pub mod release;
pub mod request;
pub mod reserve;
pub mod services;
pub mod settings;
pub mod sweeper;
mod transaction;

pub use check::{CheckRequest, CheckResult, InventoryCheck};
pub use checkout::{CheckoutInitiator, CheckoutRequest, CheckoutResult};
pub use commit::{CommitCoordinator, CommitOutcome, CommitRequest, CommitResult};
pub use error::{CheckoutError, ErrorKind, InventoryError};
pub use idempotency::IdempotencyCache;
pub use release::{ReleaseCoordinator, ReleaseRequest, ReleaseResult};
pub use request::{LineItem, LineItemInput, NotApplicable};
pub use reserve::{
    MAX_RESERVE_ITEMS, ReservationCoordinator, ReserveOutcome, ReserveRequest, ReserveResult,
};
pub use services::{
    CartItem, CartStore, ExecutionHandle, InMemoryCartStore, InMemoryOrchestrator, Orchestrator,
    ServiceError,
};
pub use settings::ReservationSettings;
pub use sweeper::{ExpirySweeper, SweepReport};
