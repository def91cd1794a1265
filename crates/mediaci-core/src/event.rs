//! Change events produced by the change sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PULL_REQUEST_PREFIX: &str = "refs/pull/";
const HEADS_PREFIX: &str = "refs/heads/";

/// An incoming unit of work: one revision on one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub repository_url: String,
    pub branch: String,
    pub revision: String,
    pub created_at: DateTime<Utc>,
    /// Override used for forced-branch and pull-request builds.
    #[serde(default)]
    pub target_branch: Option<String>,
    /// Paths touched by the change, relative to the repository root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl ChangeEvent {
    pub fn new(
        repository_url: impl Into<String>,
        branch: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: branch.into(),
            revision: revision.into(),
            created_at: Utc::now(),
            target_branch: None,
            files: vec![],
        }
    }

    pub fn with_target_branch(mut self, target_branch: impl Into<String>) -> Self {
        self.target_branch = Some(target_branch.into());
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The branch used for predicate evaluation.
    pub fn effective_branch(&self) -> &str {
        self.target_branch.as_deref().unwrap_or(&self.branch)
    }

    /// Repository name derived from its URL.
    ///
    /// `https://github.com/Intel-Media-SDK/product-configs.git` -> `product-configs`
    pub fn repository_name(&self) -> &str {
        repository_name(&self.repository_url)
    }

    /// Branch name with a leading `refs/heads/` removed.
    pub fn short_branch(&self) -> &str {
        self.branch.strip_prefix(HEADS_PREFIX).unwrap_or(&self.branch)
    }

    pub fn is_pull_request(&self) -> bool {
        self.branch.starts_with(PULL_REQUEST_PREFIX)
    }

    /// Pull request number for `refs/pull/<n>/head` branches.
    pub fn pull_request_number(&self) -> Option<u64> {
        self.branch
            .strip_prefix(PULL_REQUEST_PREFIX)?
            .split('/')
            .next()?
            .parse()
            .ok()
    }

    /// Commit descriptor handed to the build tool, `<repo>:<branch>:<revision>`.
    pub fn changed_repo(&self) -> String {
        format!(
            "{}:{}:{}",
            self.repository_name(),
            self.branch,
            self.revision
        )
    }
}

pub fn repository_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_branch_prefers_target() {
        let event = ChangeEvent::new("https://github.com/org/MediaSDK.git", "pr-123", "abc");
        assert_eq!(event.effective_branch(), "pr-123");

        let event = event.with_target_branch("release/2024");
        assert_eq!(event.effective_branch(), "release/2024");
        assert_eq!(event.branch, "pr-123");
    }

    #[test]
    fn test_repository_name() {
        assert_eq!(
            repository_name("https://github.com/Intel-Media-SDK/product-configs.git"),
            "product-configs"
        );
        assert_eq!(repository_name("https://github.com/intel/media-driver"), "media-driver");
        assert_eq!(repository_name("git@github.com:org/flow_test.git"), "flow_test");
    }

    #[test]
    fn test_changed_repo() {
        let event = ChangeEvent::new(
            "https://github.com/Intel-Media-SDK/MediaSDK.git",
            "refs/pull/1303/head",
            "ef64b58a",
        );
        assert_eq!(event.changed_repo(), "MediaSDK:refs/pull/1303/head:ef64b58a");
        assert!(event.is_pull_request());
        assert_eq!(event.pull_request_number(), Some(1303));
    }

    #[test]
    fn test_short_branch() {
        let event = ChangeEvent::new("https://github.com/org/repo.git", "refs/heads/master", "1");
        assert_eq!(event.short_branch(), "master");
        assert!(!event.is_pull_request());
        assert_eq!(event.pull_request_number(), None);
    }
}
