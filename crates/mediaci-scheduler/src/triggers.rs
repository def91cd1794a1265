//! Change admission.
//!
//! Mirrors what the pollers watch: a fixed set of repositories, their
//! long-lived branches and open pull requests, narrowed per repository by
//! the files a change touches.

use mediaci_core::config::ChangeFilterConfig;
use mediaci_core::event::ChangeEvent;
use tracing::debug;

/// Decides whether a change from a change source enters the orchestrator.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    config: ChangeFilterConfig,
}

impl ChangeFilter {
    pub fn new(config: ChangeFilterConfig) -> Self {
        Self { config }
    }

    /// Check if a change should be processed.
    pub fn admits(&self, event: &ChangeEvent) -> bool {
        let repository = event.repository_name();
        if !self.repository_watched(repository) {
            debug!(repository, "Repository is not watched");
            return false;
        }

        if !self.config.files_relevant(repository, &event.files) {
            debug!(repository, files = event.files.len(), "No relevant files changed");
            return false;
        }

        if event.is_pull_request() {
            return self.config.pull_requests && event.pull_request_number().is_some();
        }

        let branch = event.short_branch();
        let polled = self.config.branches.iter().any(|p| p.matches(branch));
        if !polled {
            debug!(repository, branch, "Branch is not polled");
        }
        polled
    }

    fn repository_watched(&self, repository: &str) -> bool {
        self.config.repositories.is_empty()
            || self.config.repositories.iter().any(|r| r == repository)
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self::new(ChangeFilterConfig::default())
    }
}
