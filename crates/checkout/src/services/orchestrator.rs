//! Workflow orchestrator trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OrderDraft;
use serde::{Deserialize, Serialize};

use super::ServiceError;

/// Identifies a started workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// Starts the workflow that sequences reserve, payment and fulfillment.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn start_execution(
        &self,
        name: &str,
        draft: &OrderDraft,
    ) -> Result<ExecutionHandle, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryOrchestratorState {
    executions: Vec<(ExecutionHandle, OrderDraft)>,
    fail_on_start: bool,
}

/// In-memory orchestrator that records every execution it is asked to start.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrchestrator {
    state: Arc<RwLock<InMemoryOrchestratorState>>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the orchestrator to reject every start.
    pub fn set_fail_on_start(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_on_start = fail;
        }
    }

    /// Returns the drafts of every started execution, oldest first.
    pub fn started_drafts(&self) -> Vec<OrderDraft> {
        self.state
            .read()
            .map(|s| s.executions.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    pub fn execution_count(&self) -> usize {
        self.state.read().map(|s| s.executions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn start_execution(
        &self,
        name: &str,
        draft: &OrderDraft,
    ) -> Result<ExecutionHandle, ServiceError> {
        let mut state = self.state.write().map_err(|_| ServiceError::Unavailable {
            service: "orchestrator",
            reason: "state lock poisoned".to_string(),
        })?;

        if state.fail_on_start {
            return Err(ServiceError::Unavailable {
                service: "orchestrator",
                reason: "configured to fail".to_string(),
            });
        }

        let handle = ExecutionHandle {
            execution_id: format!("EXEC-{:04}", state.executions.len() + 1),
            name: name.to_string(),
            started_at: Utc::now(),
        };
        state.executions.push((handle.clone(), draft.clone()));
        Ok(handle)
    }
}
