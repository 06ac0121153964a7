//! Octopus GitHub - pull request access for Octopus
//!
//! Reads pull request details, commits, comments and changed files, lists
//! open pull requests, and opens the follow-up pull request carrying fixes.

mod client;
mod error;
mod pr;

pub use client::GitHubClient;
pub use error::{Error, Result};
pub use pr::{PullRequestFile, PullRequestSummary};
