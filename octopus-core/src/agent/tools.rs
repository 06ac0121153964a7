//! Repository access for agents
//!
//! Backends without native tools get the repository layout and the relevant
//! files rendered into their prompts, and return file edits that are applied
//! here.

use std::path::{Component, Path, PathBuf};

use crate::contract::FileEdit;
use crate::{Error, Result};

/// Recursively list files under `dir`, skipping `ignored` directory names
///
/// Output format: `File paths: \n-<dir>/<a>\n- <dir>/<b>`.
pub fn list_directory(dir: &Path, ignored: &[String]) -> Result<String> {
    let base = dir.to_string_lossy();
    let base = base.trim_end_matches('/');

    let mut files = Vec::new();
    collect_files(dir, Path::new(""), ignored, &mut files)?;
    files.sort();

    let listing = files
        .iter()
        .map(|rel| format!("{}/{}", base, rel.display()))
        .collect::<Vec<_>>()
        .join("\n- ");

    Ok(format!("File paths: \n-{}", listing))
}

fn collect_files(root: &Path, rel: &Path, ignored: &[String], out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let name = entry.file_name();
        let child = rel.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if ignored.iter().any(|i| name.to_string_lossy() == i.as_str()) {
                continue;
            }
            collect_files(root, &child, ignored, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

/// Resolve an agent-supplied path to a relative path inside `root`
///
/// Absolute paths are accepted only when they point inside `root`. Any `..`
/// component is rejected, as is anything under `.git`.
pub fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path.trim());

    let relative = if candidate.is_absolute() {
        candidate.strip_prefix(root).map_err(|_| {
            Error::Agent(format!("Path {} is outside the repository", path))
        })?
    } else {
        candidate
    };

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::Agent(format!(
                    "Path {} escapes the repository",
                    path
                )))
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(Error::Agent(format!("Path {:?} names no file", path)));
    }
    if clean.components().next() == Some(Component::Normal(".git".as_ref())) {
        return Err(Error::Agent(format!(
            "Path {} is inside the git directory",
            path
        )));
    }

    Ok(clean)
}

/// Refuse a relative path if it or any existing ancestor below `root` is a symlink
fn ensure_no_symlinks(root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::Agent(format!(
                    "Path {} goes through a symbolic link",
                    relative.display()
                )));
            }
            Ok(_) => {}
            // Nothing below a missing entry exists yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Resolve a path and check it does not leave `root` through a link
fn checked_path(root: &Path, path: &str) -> Result<PathBuf> {
    let relative = resolve_in_root(root, path)?;
    ensure_no_symlinks(root, &relative)?;
    Ok(relative)
}

/// Read a file inside the repository
pub fn read_file(root: &Path, path: &str) -> Result<String> {
    let relative = checked_path(root, path)?;
    std::fs::read_to_string(root.join(&relative)).map_err(|e| {
        Error::Agent(format!("Failed to read {}: {}", relative.display(), e))
    })
}

/// Write developer edits into the repository
///
/// Every path is validated before anything is written: no traversal, nothing
/// under `.git`, and no symlinked file or directory on the way. Returns the
/// relative paths written.
pub fn apply_file_edits(root: &Path, edits: &[FileEdit]) -> Result<Vec<PathBuf>> {
    let resolved = edits
        .iter()
        .map(|edit| Ok((checked_path(root, &edit.path)?, edit)))
        .collect::<Result<Vec<_>>>()?;

    let mut written = Vec::with_capacity(resolved.len());
    for (relative, edit) in resolved {
        let target = root.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &edit.content)?;
        tracing::info!(file = %relative.display(), bytes = edit.content.len(), "Applied edit");
        written.push(relative);
    }

    Ok(written)
}

/// Files touched by a unified diff, in order of appearance
pub fn changed_files(diff: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();

    for line in diff.lines() {
        let Some(rest) = line.strip_prefix("diff --git ") else {
            continue;
        };
        // "a/<path> b/<path>"; take the post-image side
        let path = rest
            .rsplit_once(" b/")
            .map(|(_, b)| b)
            .unwrap_or(rest)
            .trim();
        if !path.is_empty() && !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    }

    files
}

/// Read the files a diff touches, skipping ones that no longer exist
pub fn read_changed_files(root: &Path, diff: &str) -> Vec<(String, String)> {
    changed_files(diff)
        .into_iter()
        .filter_map(|path| match read_file(root, &path) {
            Ok(content) => Some((path, content)),
            Err(e) => {
                tracing::debug!(path, error = %e, "Skipping unreadable changed file");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn edit(path: &str, content: &str) -> FileEdit {
        FileEdit {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_list_directory_skips_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::create_dir_all(dir.path().join("python_testcases")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        std::fs::write(dir.path().join("__pycache__/app.pyc"), "").unwrap();
        std::fs::write(dir.path().join("python_testcases/test_app.py"), "").unwrap();

        let ignored = vec!["__pycache__".to_string(), "python_testcases".to_string()];
        let listing = list_directory(dir.path(), &ignored).unwrap();
        let base = dir.path().display().to_string();

        assert_eq!(
            listing,
            format!("File paths: \n-{base}/README.md\n- {base}/src/app.py")
        );
    }

    #[test]
    fn test_resolve_in_root() {
        let root = Path::new("/work/repo");
        assert_eq!(
            resolve_in_root(root, "src/app.py").unwrap(),
            PathBuf::from("src/app.py")
        );
        assert_eq!(
            resolve_in_root(root, "/work/repo/src/app.py").unwrap(),
            PathBuf::from("src/app.py")
        );
        assert_eq!(
            resolve_in_root(root, "./app.py").unwrap(),
            PathBuf::from("app.py")
        );
        assert!(resolve_in_root(root, "../etc/passwd").is_err());
        assert!(resolve_in_root(root, "src/../../x").is_err());
        assert!(resolve_in_root(root, "/etc/passwd").is_err());
        assert!(resolve_in_root(root, "").is_err());
        assert!(resolve_in_root(root, ".git/hooks/pre-push").is_err());
        assert!(resolve_in_root(root, "./.git/config").is_err());
        assert!(resolve_in_root(root, "/work/repo/.git/HEAD").is_err());
        assert_eq!(
            resolve_in_root(root, "docs/.git/notes").unwrap(),
            PathBuf::from("docs/.git/notes")
        );
    }

    #[test]
    fn test_apply_file_edits_rejects_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/hooks")).unwrap();

        let result = apply_file_edits(
            dir.path(),
            &[edit(".git/hooks/pre-push", "#!/bin/sh\ncurl evil\n")],
        );

        assert!(result.is_err());
        assert!(!dir.path().join(".git/hooks/pre-push").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_file_edits_refuses_symlinks() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.txt");
        std::fs::write(&victim, "untouched").unwrap();

        let dir = TempDir::new().unwrap();
        symlink(&victim, dir.path().join("calc.py")).unwrap();
        symlink(outside.path(), dir.path().join("vendor")).unwrap();

        assert!(apply_file_edits(dir.path(), &[edit("calc.py", "overwritten")]).is_err());
        assert!(apply_file_edits(dir.path(), &[edit("vendor/new.py", "x")]).is_err());
        assert!(apply_file_edits(dir.path(), &[edit("ok.py", "x"), edit("calc.py", "y")]).is_err());

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "untouched");
        assert!(!outside.path().join("new.py").exists());
        assert!(!dir.path().join("ok.py").exists());
        assert!(read_file(dir.path(), "calc.py").is_err());
    }

    #[test]
    fn test_apply_file_edits() {
        let dir = TempDir::new().unwrap();
        let written = apply_file_edits(
            dir.path(),
            &[edit("pkg/util.py", "x = 1\n"), edit("app.py", "y = 2\n")],
        )
        .unwrap();

        assert_eq!(written, vec![PathBuf::from("pkg/util.py"), PathBuf::from("app.py")]);
        assert_eq!(read_file(dir.path(), "pkg/util.py").unwrap(), "x = 1\n");
    }

    #[test]
    fn test_apply_file_edits_rejects_traversal_before_writing() {
        let dir = TempDir::new().unwrap();
        let result = apply_file_edits(
            dir.path(),
            &[edit("ok.py", "fine"), edit("../escape.py", "bad")],
        );

        assert!(result.is_err());
        assert!(!dir.path().join("ok.py").exists());
    }

    #[test]
    fn test_changed_files() {
        let diff = "diff --git a/src/app.py b/src/app.py\nindex 1..2\n--- a/src/app.py\n+++ b/src/app.py\n@@ -1 +1 @@\n-a\n+b\ndiff --git a/old.py b/new.py\nsimilarity index 90%\n";
        assert_eq!(changed_files(diff), vec!["src/app.py", "new.py"]);
        assert!(changed_files("").is_empty());
    }

    #[test]
    fn test_read_changed_files_skips_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "print(1)\n").unwrap();
        let diff = "diff --git a/app.py b/app.py\ndiff --git a/gone.py b/gone.py\n";

        let files = read_changed_files(dir.path(), diff);
        assert_eq!(files, vec![("app.py".to_string(), "print(1)\n".to_string())]);
    }
}
