//! External collaborator traits and in-memory implementations.

pub mod cart;
pub mod orchestrator;

use thiserror::Error;

pub use cart::{CartItem, CartStore, InMemoryCartStore};
pub use orchestrator::{ExecutionHandle, InMemoryOrchestrator, Orchestrator};

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The collaborator could not be reached or refused the call.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
}
