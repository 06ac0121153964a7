//! Shared state carried through the flow

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::services::{CreatedPullRequest, PullRequestDetails};
use crate::evaluation::EvaluationReport;

/// Everything the flow learns, filled in phase by phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowState {
    /// `owner/repo`
    pub repo: String,
    pub pr_number: u64,
    /// Branch the follow-up pull request targets
    pub target_branch: String,
    pub requirement_id: Option<String>,
    pub repo_url: Option<String>,
    pub repo_dir: Option<PathBuf>,
    pub pr_details: Option<PullRequestDetails>,
    pub pr_diff: Option<String>,
    pub pr_local_branch: Option<String>,
    pub pull_request_summary: Option<String>,
    pub bug_present: bool,
    pub fixed_files: Vec<String>,
    pub commit_hash: Option<String>,
    pub created_pull_request: Option<CreatedPullRequest>,
    /// Why no follow-up pull request was opened although bugs were found
    pub pull_request_error: Option<String>,
    pub evaluation: Option<EvaluationReport>,
}

impl FlowState {
    pub fn new(repo: impl Into<String>, pr_number: u64, target_branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            pr_number,
            target_branch: target_branch.into(),
            ..Default::default()
        }
    }

    pub fn with_requirement(mut self, requirement_id: Option<String>) -> Self {
        self.requirement_id = requirement_id;
        self
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
