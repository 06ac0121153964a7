//! Pull request reading and creation

use async_trait::async_trait;
use octocrab::models::pulls::PullRequest as OctocrabPR;
use octopus_core::flow::{CreatedPullRequest, PullRequestDetails, PullRequestService};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// One line of `octopus pr list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: Option<String>,
    pub head_branch: String,
    pub base_branch: String,
    pub url: Option<String>,
}

impl From<OctocrabPR> for PullRequestSummary {
    fn from(pr: OctocrabPR) -> Self {
        PullRequestSummary {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            author: pr.user.map(|u| u.login),
            head_branch: pr.head.ref_field,
            base_branch: pr.base.ref_field,
            url: pr.html_url.map(|u| u.to_string()),
        }
    }
}

/// A file changed by a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct IssueComment {
    user: Option<Login>,
    #[serde(default)]
    body: Option<String>,
}

impl IssueComment {
    fn render(self) -> String {
        let author = self.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string());
        format!("{}: {}", author, self.body.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestCommit {
    commit: CommitDetail,
}

fn not_found(number: u64) -> impl Fn(octocrab::Error) -> Error {
    move |e| match &e {
        octocrab::Error::GitHub { source, .. } if source.message.contains("Not Found") => {
            Error::PrNotFound(number)
        }
        _ => Error::Api(e),
    }
}

fn state_name(pr: &OctocrabPR) -> String {
    match pr.state {
        Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => "merged".to_string(),
        Some(octocrab::models::IssueState::Closed) => "closed".to_string(),
        _ => "open".to_string(),
    }
}

impl GitHubClient {
    /// Title, body, branches, comments and commit messages of a pull request
    pub async fn get_pull_request_details(&self, number: u64) -> Result<PullRequestDetails> {
        debug!(number, "Fetching pull request");

        let pr = self
            .client()
            .pulls(self.owner(), self.repo())
            .get(number)
            .await
            .map_err(not_found(number))?;

        let comments: Vec<IssueComment> = self
            .client()
            .get(self.route(&format!("issues/{}/comments", number)), None::<&()>)
            .await
            .map_err(Error::Api)?;

        let commits: Vec<PullRequestCommit> = self
            .client()
            .get(self.route(&format!("pulls/{}/commits", number)), None::<&()>)
            .await
            .map_err(Error::Api)?;

        info!(
            number,
            comments = comments.len(),
            commits = commits.len(),
            "Fetched pull request details"
        );

        Ok(PullRequestDetails {
            number: pr.number,
            state: state_name(&pr),
            title: pr.title.unwrap_or_default(),
            body: pr.body,
            head_branch: pr.head.ref_field,
            base_branch: pr.base.ref_field,
            comments: comments.into_iter().map(IssueComment::render).collect(),
            commits: commits.into_iter().map(|c| c.commit.message).collect(),
        })
    }

    pub async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestSummary>> {
        debug!("Listing open pull requests");

        let page = self
            .client()
            .pulls(self.owner(), self.repo())
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await
            .map_err(Error::Api)?;

        let prs: Vec<PullRequestSummary> = page.items.into_iter().map(Into::into).collect();
        info!(count = prs.len(), "Fetched open pull requests");
        Ok(prs)
    }

    pub async fn list_pull_request_files(&self, number: u64) -> Result<Vec<PullRequestFile>> {
        debug!(number, "Listing pull request files");

        self.client()
            .get(
                self.route(&format!("pulls/{}/files", number)),
                Some(&[("per_page", 100)]),
            )
            .await
            .map_err(not_found(number))
    }

    /// Open a pull request from `head` into `base`
    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<CreatedPullRequest> {
        debug!(title, head, base, "Creating pull request");

        let pr = self
            .client()
            .pulls(self.owner(), self.repo())
            .create(title, head, base)
            .body(body)
            .send()
            .await
            .map_err(Error::Api)?;

        let url = pr
            .html_url
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://github.com/{}/pull/{}", self.slug(), pr.number));
        info!(number = pr.number, url = %url, "Created pull request");

        Ok(CreatedPullRequest {
            number: pr.number,
            url,
        })
    }
}

#[async_trait]
impl PullRequestService for GitHubClient {
    async fn get_pull_request_details(
        &self,
        repo: &str,
        number: u64,
    ) -> octopus_core::Result<PullRequestDetails> {
        Ok(self.for_repo(repo)?.get_pull_request_details(number).await?)
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> octopus_core::Result<CreatedPullRequest> {
        Ok(self
            .for_repo(repo)?
            .create_pull_request(title, body, head, base)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_render() {
        let comments: Vec<IssueComment> = serde_json::from_str(
            r#"[
                {"id": 1, "user": {"login": "alice", "id": 7}, "body": "Looks off by one"},
                {"id": 2, "user": null, "body": null}
            ]"#,
        )
        .unwrap();
        let rendered: Vec<String> = comments.into_iter().map(IssueComment::render).collect();
        assert_eq!(rendered, vec!["alice: Looks off by one", "unknown: "]);
    }

    #[test]
    fn test_commit_messages() {
        let commits: Vec<PullRequestCommit> = serde_json::from_str(
            r#"[{"sha": "abc", "commit": {"message": "Refactor add", "author": {"name": "a"}}}]"#,
        )
        .unwrap();
        assert_eq!(commits[0].commit.message, "Refactor add");
    }

    #[test]
    fn test_files() {
        let files: Vec<PullRequestFile> = serde_json::from_str(
            r#"[{"sha": "1", "filename": "python_programs/bitcount.py", "status": "modified",
                 "additions": 2, "deletions": 1, "changes": 3, "patch": "@@"}]"#,
        )
        .unwrap();
        assert_eq!(files[0].filename, "python_programs/bitcount.py");
        assert_eq!(files[0].status, "modified");
        assert_eq!(files[0].changes, 3);
    }
}
