//! Collaborators the flow drives: the pull request host and the local clone

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::contract::DEFAULT_COMMIT_MESSAGE;
use crate::git::{clone_to_workspace, GitRepo, RepoUrl};
use crate::Result;

/// Pull request metadata handed to the agents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub base_branch: String,
    /// Issue comments, `author: text`
    #[serde(default)]
    pub comments: Vec<String>,
    /// Commit messages
    #[serde(default)]
    pub commits: Vec<String>,
}

impl PullRequestDetails {
    /// Pretty JSON, as embedded in prompts
    pub fn to_prompt(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub url: String,
}

/// Read and open pull requests on the hosting service
#[async_trait]
pub trait PullRequestService: Send + Sync {
    async fn get_pull_request_details(&self, repo: &str, number: u64) -> Result<PullRequestDetails>;

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<CreatedPullRequest>;
}

/// Local git operations on the working clone
#[async_trait]
pub trait RepoWorkspace: Send + Sync {
    /// Clone `repo_url` into a fresh directory and return it
    async fn clone_repository(&self, repo_url: &str) -> Result<PathBuf>;

    /// Fetch the PR head into `local_branch` and diff it against `base`
    async fn fetch_diff(
        &self,
        repo_dir: &Path,
        pr_number: u64,
        local_branch: &str,
        base: &str,
        incremental: bool,
    ) -> Result<String>;

    async fn checkout(&self, repo_dir: &Path, branch: &str) -> Result<()>;

    async fn has_changes(&self, repo_dir: &Path) -> Result<bool>;

    /// Commit everything, push `branch`, and return the new HEAD
    async fn commit_and_push(
        &self,
        repo_dir: &Path,
        branch: &str,
        message: &str,
    ) -> Result<Option<String>>;
}

/// `RepoWorkspace` over real clones beneath a workspace directory
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    workspace_dir: PathBuf,
}

impl GitWorkspace {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }
}

#[async_trait]
impl RepoWorkspace for GitWorkspace {
    async fn clone_repository(&self, repo_url: &str) -> Result<PathBuf> {
        let url = RepoUrl::parse(repo_url)?;
        clone_to_workspace(&url, &self.workspace_dir)
    }

    async fn fetch_diff(
        &self,
        repo_dir: &Path,
        pr_number: u64,
        local_branch: &str,
        base: &str,
        incremental: bool,
    ) -> Result<String> {
        let repo = GitRepo::open(repo_dir)?;
        repo.fetch_pull_request(pr_number, local_branch)?;
        repo.diff(base, local_branch, incremental)
    }

    async fn checkout(&self, repo_dir: &Path, branch: &str) -> Result<()> {
        GitRepo::open(repo_dir)?.checkout(branch)
    }

    async fn has_changes(&self, repo_dir: &Path) -> Result<bool> {
        GitRepo::open(repo_dir)?.has_changes()
    }

    async fn commit_and_push(
        &self,
        repo_dir: &Path,
        branch: &str,
        message: &str,
    ) -> Result<Option<String>> {
        let repo = GitRepo::open(repo_dir)?;
        let message = if message.trim().is_empty() {
            DEFAULT_COMMIT_MESSAGE
        } else {
            message
        };
        repo.commit_all(message)?;
        repo.push(branch)?;
        repo.head_commit()
    }
}
