//! Port traits (hexagonal architecture).
//!
//! These traits define the boundary between the orchestrator and the
//! collaborators it drives: the stage executor, the status reporter and the
//! target-branch resolver.

use crate::event::ChangeEvent;
use crate::stage::{BuildResult, StageCommand, StageOutcome};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One command to run on a leased worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Build or test the command belongs to.
    pub build: String,
    pub worker: String,
    pub command: StageCommand,
}

/// Runs resolved commands and reports an opaque result code plus log text.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Execute one command. `Err` means the command could not be run at all.
    async fn execute(&self, request: &ExecutionRequest) -> Result<StageOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "snake_case")]
pub enum ReportState {
    Started,
    Finished(BuildResult),
}

/// Per-build status pushed to the external reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub name: String,
    /// Status context, `mediaci/<name>`.
    pub context: String,
    pub repository_url: String,
    pub revision: String,
    pub state: ReportState,
}

impl StatusUpdate {
    pub fn new(name: &str, event: &ChangeEvent, state: ReportState) -> Self {
        Self {
            name: name.to_string(),
            context: format!("mediaci/{}", name),
            repository_url: event.repository_url.clone(),
            revision: event.revision.clone(),
            state,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.state {
            ReportState::Started => "Started",
            ReportState::Finished(_) => "Done",
        }
    }
}

#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, update: &StatusUpdate) -> Result<()>;
}

/// Resolves the target branch of a change once the trigger build has run.
#[async_trait]
pub trait TargetBranchResolver: Send + Sync {
    async fn resolve(&self, event: &ChangeEvent) -> Result<Option<String>>;
}

/// Leaves the event's own target branch untouched.
pub struct NoTargetBranch;

#[async_trait]
impl TargetBranchResolver for NoTargetBranch {
    async fn resolve(&self, event: &ChangeEvent) -> Result<Option<String>> {
        Ok(event.target_branch.clone())
    }
}

/// Maps pull request refs to their base branch.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetBranches {
    by_branch: HashMap<String, String>,
}

impl StaticTargetBranches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, branch: impl Into<String>, target: impl Into<String>) -> Self {
        self.by_branch.insert(branch.into(), target.into());
        self
    }
}

#[async_trait]
impl TargetBranchResolver for StaticTargetBranches {
    async fn resolve(&self, event: &ChangeEvent) -> Result<Option<String>> {
        Ok(self
            .by_branch
            .get(&event.branch)
            .cloned()
            .or_else(|| event.target_branch.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_context() {
        let event = ChangeEvent::new("https://github.com/intel/media-driver.git", "master", "abc");
        let update = StatusUpdate::new("build", &event, ReportState::Started);
        assert_eq!(update.context, "mediaci/build");
        assert_eq!(update.description(), "Started");

        let done = StatusUpdate::new("build", &event, ReportState::Finished(BuildResult::Failure));
        assert_eq!(done.description(), "Done");
    }
}
