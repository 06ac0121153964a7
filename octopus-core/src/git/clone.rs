//! Repository URL parsing and cloning into the workspace

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};

use crate::{Error, Result};

/// Parsed repository information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// Repository owner/organization
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Full clone URL
    pub clone_url: String,
    /// Host (e.g., "github.com")
    pub host: String,
}

impl RepoUrl {
    /// Parse a repository URL or shorthand
    ///
    /// Supports:
    /// - `https://github.com/owner/repo`
    /// - `https://github.com/owner/repo.git`
    /// - `git@github.com:owner/repo.git`
    /// - `owner/repo` (assumes GitHub)
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        // owner/repo shorthand
        if !input.contains("://") && !input.contains('@') && input.contains('/') {
            let parts: Vec<&str> = input.split('/').collect();
            if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
                let owner = parts[0].to_string();
                let repo = parts[1].trim_end_matches(".git").to_string();
                return Ok(Self {
                    clone_url: format!("https://github.com/{}/{}.git", owner, repo),
                    owner,
                    repo,
                    host: "github.com".to_string(),
                });
            }
        }

        // git@github.com:owner/repo.git
        if let Some(rest) = input.strip_prefix("git@") {
            if let Some((host, path)) = rest.split_once(':') {
                let path = path.trim_end_matches(".git");
                let parts: Vec<&str> = path.split('/').collect();
                if parts.len() >= 2 {
                    return Ok(Self {
                        owner: parts[0].to_string(),
                        repo: parts[1].to_string(),
                        clone_url: input.to_string(),
                        host: host.to_string(),
                    });
                }
            }
        }

        if input.starts_with("https://") || input.starts_with("http://") {
            if let Ok(url) = url::Url::parse(input) {
                let host = url.host_str().unwrap_or("").to_string();
                let path = url.path().trim_start_matches('/').trim_end_matches(".git");
                let parts: Vec<&str> = path.split('/').collect();

                if parts.len() >= 2 && !parts[1].is_empty() {
                    let clone_url = if input.ends_with(".git") {
                        input.to_string()
                    } else {
                        format!("{}.git", input.trim_end_matches('/'))
                    };

                    return Ok(Self {
                        owner: parts[0].to_string(),
                        repo: parts[1].to_string(),
                        clone_url,
                        host,
                    });
                }
            }
        }

        Err(Error::Config(format!(
            "Invalid repository URL: {}. Expected format: owner/repo, https://github.com/owner/repo, or git@github.com:owner/repo.git",
            input
        )))
    }

    /// `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Browser URL of the repository
    pub fn https_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// Directory-safe name (owner-repo)
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.owner, self.repo)
    }
}

/// Pick a fresh clone directory under `parent`
///
/// Named `apr_<owner>-<repo>-<timestamp>`, suffixed with a counter when taken.
pub fn workspace_clone_dir(repo_url: &RepoUrl, parent: &Path, now: DateTime<Local>) -> PathBuf {
    let base = format!(
        "apr_{}-{}",
        repo_url.cache_name(),
        now.format("%Y%m%d%H%M%S")
    );

    let mut candidate = parent.join(&base);
    let mut counter = 1;
    while candidate.exists() {
        candidate = parent.join(format!("{}-{}", base, counter));
        counter += 1;
    }
    candidate
}

/// Clone a repository into a fresh directory beneath `parent`
pub fn clone_to_workspace(repo_url: &RepoUrl, parent: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(parent)
        .map_err(|e| Error::Other(format!("Failed to create workspace directory: {}", e)))?;

    let target_dir = workspace_clone_dir(repo_url, parent, Local::now());

    tracing::info!(url = %repo_url.clone_url, target = %target_dir.display(), "Cloning repository");

    let output = Command::new("git")
        .arg("clone")
        .arg(&repo_url.clone_url)
        .arg(&target_dir)
        .output()
        .map_err(|e| Error::Git(format!("Failed to run git clone: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stderr.contains("Authentication failed") || stderr.contains("Permission denied") {
            return Err(Error::Config(format!(
                "Authentication failed for {}. Check your credentials or repository access.",
                repo_url.clone_url
            )));
        }

        if stderr.contains("Could not resolve host") || stderr.contains("unable to access") {
            return Err(Error::Config(format!(
                "Network error cloning {}. Check your internet connection.",
                repo_url.clone_url
            )));
        }

        if stderr.contains("not found") || stderr.contains("does not exist") {
            return Err(Error::Config(format!(
                "Repository not found: {}. Check the URL is correct.",
                repo_url.clone_url
            )));
        }

        return Err(Error::Git(format!("git clone failed: {}", stderr.trim())));
    }

    Ok(target_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_parse_shorthand() {
        let url = RepoUrl::parse("owner/repo").unwrap();
        assert_eq!(url.owner, "owner");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.host, "github.com");
        assert_eq!(url.clone_url, "https://github.com/owner/repo.git");
        assert_eq!(url.slug(), "owner/repo");
        assert_eq!(url.https_url(), "https://github.com/owner/repo");
    }

    #[test]
    fn test_parse_https() {
        let url = RepoUrl::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(url.owner, "owner");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.clone_url, "https://github.com/owner/repo.git");
    }

    #[test]
    fn test_parse_https_with_git() {
        let url = RepoUrl::parse("https://github.com/owner/repo.git").unwrap();
        assert_eq!(url.owner, "owner");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.clone_url, "https://github.com/owner/repo.git");
    }

    #[test]
    fn test_parse_git_ssh() {
        let url = RepoUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert_eq!(url.owner, "owner");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.host, "github.com");
        assert_eq!(url.clone_url, "git@github.com:owner/repo.git");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("invalid").is_err());
        assert!(RepoUrl::parse("").is_err());
        assert!(RepoUrl::parse("owner/").is_err());
    }

    #[test]
    fn test_workspace_clone_dir_is_unique() {
        let parent = TempDir::new().unwrap();
        let url = RepoUrl::parse("owner/repo").unwrap();
        let now = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();

        let first = workspace_clone_dir(&url, parent.path(), now);
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            "apr_owner-repo-20250304050607"
        );

        std::fs::create_dir(&first).unwrap();
        let second = workspace_clone_dir(&url, parent.path(), now);
        assert_ne!(first, second);
        assert!(second
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("-1"));
    }
}
