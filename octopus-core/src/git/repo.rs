//! Git repository inspection and local operations

use std::path::{Path, PathBuf};

use git2::{build::CheckoutBuilder, IndexAddOption, Repository, Signature, StatusOptions};

use crate::{Error, Result};

/// A git repository wrapper providing octopus-specific operations
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the repository root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!("Not a git repository: {}", path.display()))
            } else {
                Error::Git(e.message().to_string())
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if the given path is inside a git repository
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(Error::Git(format!("Failed to get HEAD: {}", e))),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// Get the commit hash HEAD points at
    pub fn head_commit(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) => Ok(head.target().map(|oid| oid.to_string())),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(Error::Git(format!("Failed to get HEAD: {}", e))),
        }
    }

    /// Get the default branch name (main or master)
    pub fn default_branch(&self) -> Result<String> {
        for candidate in [
            "refs/remotes/origin/main",
            "refs/remotes/origin/master",
            "refs/heads/main",
            "refs/heads/master",
        ] {
            if self.repo.find_reference(candidate).is_ok() {
                let name = candidate.rsplit('/').next().unwrap_or("main");
                return Ok(name.to_string());
            }
        }

        Ok("main".to_string())
    }

    /// Whether the working tree has uncommitted changes, untracked files included
    ///
    /// Equivalent to `git status --porcelain` producing output.
    pub fn has_changes(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    /// Whether a local branch exists
    pub fn has_local_branch(&self, branch: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/heads/{}", branch))
            .is_ok()
    }

    /// Whether a branch exists on the origin remote
    pub fn has_remote_branch(&self, branch: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .is_ok()
    }

    /// Check out an existing local branch
    pub fn checkout(&self, branch: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", branch);
        let reference = self
            .repo
            .find_reference(&refname)
            .map_err(|e| Error::Git(format!("Branch '{}' not found: {}", branch, e)))?;
        let tree = reference.peel_to_tree()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))?;
        self.repo.set_head(&refname)?;

        tracing::info!(branch, "Checked out branch");
        Ok(())
    }

    /// Stage every change (additions, modifications, deletions) and commit
    ///
    /// Returns the new commit hash.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;

        tracing::info!(commit = %oid, "Committed changes");
        Ok(oid.to_string())
    }

    /// Committer identity from git config, falling back to a bot identity
    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now("Octopus", "octopus@users.noreply.github.com")?),
        }
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Initialise a repository with one committed file on `main`
    pub(crate) fn scratch_repo() -> (TempDir, GitRepo) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        std::fs::write(dir.path().join("app.py"), "def add(a, b):\n    return a + b\n").unwrap();

        let git = GitRepo::open(dir.path()).unwrap();
        git.commit_all("initial").unwrap();
        (dir, git)
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let result = GitRepo::open(dir.path());
        assert!(result.is_err());
        assert!(!GitRepo::is_git_repo(dir.path()));
    }

    #[test]
    fn test_scratch_repo_is_clean_after_commit() {
        let (_dir, git) = scratch_repo();
        assert!(!git.has_changes().unwrap());
        assert_eq!(git.current_branch().unwrap(), Some("main".to_string()));
        assert!(git.head_commit().unwrap().is_some());
        assert_eq!(git.default_branch().unwrap(), "main");
    }

    #[test]
    fn test_has_changes_detects_untracked_and_modified() {
        let (dir, git) = scratch_repo();

        std::fs::write(dir.path().join("new.py"), "x = 1\n").unwrap();
        assert!(git.has_changes().unwrap());

        git.commit_all("add new").unwrap();
        assert!(!git.has_changes().unwrap());

        std::fs::write(dir.path().join("app.py"), "def add(a, b):\n    return a - b\n").unwrap();
        assert!(git.has_changes().unwrap());
    }

    #[test]
    fn test_commit_all_stages_deletions() {
        let (dir, git) = scratch_repo();
        let before = git.head_commit().unwrap();

        std::fs::remove_file(dir.path().join("app.py")).unwrap();
        let hash = git.commit_all("remove app").unwrap();

        assert_ne!(Some(hash.clone()), before);
        assert_eq!(git.head_commit().unwrap(), Some(hash));
        assert!(!git.has_changes().unwrap());
    }

    #[test]
    fn test_checkout_branch() {
        let (_dir, git) = scratch_repo();
        let head = git.inner().head().unwrap().peel_to_commit().unwrap();
        git.inner().branch("pr-1-fix", &head, false).unwrap();

        assert!(git.has_local_branch("pr-1-fix"));
        assert!(!git.has_remote_branch("pr-1-fix"));

        git.checkout("pr-1-fix").unwrap();
        assert_eq!(git.current_branch().unwrap(), Some("pr-1-fix".to_string()));

        assert!(git.checkout("does-not-exist").is_err());
    }
}
