//! Executor that logs commands instead of running them.

use async_trait::async_trait;
use mediaci_core::Result;
use mediaci_core::ports::{ExecutionRequest, StageExecutor};
use mediaci_core::stage::StageOutcome;
use std::sync::Mutex;
use tracing::info;

/// Records every request and reports success.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    executed: Mutex<Vec<ExecutionRequest>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, in call order.
    pub fn executed(&self) -> Vec<ExecutionRequest> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl StageExecutor for DryRunExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<StageOutcome> {
        info!(
            build = %request.build,
            worker = %request.worker,
            workdir = %request.command.workdir.display(),
            "[dry-run] {}",
            request.command
        );
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(StageOutcome::success())
    }
}
