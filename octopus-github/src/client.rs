//! GitHub API client using octocrab

use crate::{Error, Result};
use octocrab::Octocrab;
use octopus_core::git::RepoUrl;
use octopus_core::Secrets;
use tracing::{debug, info};

/// GitHub API client bound to one repository
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a client for `owner/repo`
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITHUB_TOKEN environment variable
    /// 2. ~/.config/octopus/secrets.toml
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;

        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/octopus/secrets.toml"
                    .to_string(),
            )
        })?;

        let client = Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        Ok(Self::with_octocrab(client, owner, repo))
    }

    /// Wrap an already configured octocrab instance
    pub fn with_octocrab(client: Octocrab, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        let owner = owner.into();
        let repo = repo.into();
        info!(owner = %owner, repo = %repo, "Created GitHub client");
        Self {
            client,
            owner,
            repo,
        }
    }

    /// Create a client from `owner/repo`, an HTTPS URL or an SSH URL
    pub fn from_url(url: &str) -> Result<Self> {
        let (owner, repo) = parse_github_url(url)?;
        Self::new(owner, repo)
    }

    /// The same credentials pointed at another repository
    pub fn for_repo(&self, url: &str) -> Result<Self> {
        let (owner, repo) = parse_github_url(url)?;
        if owner == self.owner && repo == self.repo {
            return Ok(self.clone());
        }
        debug!(owner = %owner, repo = %repo, "Retargeting GitHub client");
        Ok(Self {
            client: self.client.clone(),
            owner,
            repo,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    /// Repository-relative API route
    pub(crate) fn route(&self, tail: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo, tail)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

/// Parse a GitHub URL into owner and repo
fn parse_github_url(url: &str) -> Result<(String, String)> {
    let parsed = RepoUrl::parse(url).map_err(|e| Error::Parse(e.to_string()))?;
    Ok((parsed.owner, parsed.repo))
}
