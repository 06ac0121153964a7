//! Pull request branches, diffs and pushes

use chrono::{DateTime, TimeZone};

use super::repo::GitRepo;
use super::run_git;
use crate::Result;

/// Name of the local branch a pull request head is fetched into
///
/// `pr-<n>-fix-<yymmddHHMMSS>`
pub fn local_fix_branch<Tz>(pr_number: u64, now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("pr-{}-fix-{}", pr_number, now.format("%y%m%d%H%M%S"))
}

impl GitRepo {
    /// Fetch the head of a pull request into a new local branch
    ///
    /// Runs `git fetch origin pull/<n>/head:<local_branch>`.
    pub fn fetch_pull_request(&self, pr_number: u64, local_branch: &str) -> Result<()> {
        let refspec = format!("pull/{}/head:{}", pr_number, local_branch);
        run_git(self.root(), &["fetch", "origin", &refspec])?;

        tracing::info!(pr = pr_number, branch = local_branch, "Fetched pull request head");
        Ok(())
    }

    /// Resolve the diff base to a ref that exists
    ///
    /// Prefers the local branch, then `origin/<base>`. Falls back to the
    /// name as given so git can report the error.
    pub fn resolve_diff_base(&self, base: &str) -> String {
        if self.has_local_branch(base) {
            base.to_string()
        } else if self.has_remote_branch(base) {
            format!("origin/{}", base)
        } else {
            base.to_string()
        }
    }

    /// Diff `branch` against `base`
    ///
    /// Incremental diffs use the merge base (`base...branch`), otherwise the
    /// two tips are compared directly (`base..branch`).
    pub fn diff(&self, base: &str, branch: &str, incremental: bool) -> Result<String> {
        let base = self.resolve_diff_base(base);
        let range = if incremental {
            format!("{}...{}", base, branch)
        } else {
            format!("{}..{}", base, branch)
        };

        let diff = run_git(self.root(), &["diff", &range])?;
        tracing::debug!(range = %range, bytes = diff.len(), "Computed diff");
        Ok(diff)
    }

    /// Push a branch to origin without running local hooks
    pub fn push(&self, branch: &str) -> Result<()> {
        run_git(self.root(), &["push", "--no-verify", "origin", branch])?;
        tracing::info!(branch, "Pushed branch");
        Ok(())
    }
}
