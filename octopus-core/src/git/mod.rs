//! Git operations for Octopus
//!
//! Cloning the target repository, fetching pull request heads, diffing,
//! and committing/pushing fixes. Network-facing commands go through the
//! `git` binary so the user's credential helpers apply; local inspection and
//! commits use git2.

mod branch;
mod clone;
mod repo;

use std::path::Path;
use std::process::Command;

use crate::{Error, Result};

pub use branch::local_fix_branch;
pub use clone::{clone_to_workspace, RepoUrl};
pub use repo::GitRepo;

#[cfg(test)]
pub(crate) use repo::tests::scratch_repo;

/// Run a git subcommand in `dir`, returning stdout on success
pub(crate) fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    tracing::debug!(dir = %dir.display(), ?args, "Running git");

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Git(format!("Failed to run git {}: {}", args.join(" "), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
