//! Running code on behalf of the crew
//!
//! After the run, each fixed file `<dir>/<name>.py` is checked by
//! `<parent of dir>/python_testcases/test_<name>.py`. During the run, QA's
//! code snippets are executed with a timeout and their real output replaces
//! the model's guess.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::contract::{CodeSnippet, TestCase};
use crate::{Error, Result};

/// Longest snippet output kept for prompts
const MAX_SNIPPET_OUTPUT: usize = 4000;

/// Outcome of running the tests for every fixed file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub tests_total: u32,
    pub tests_failed: u32,
    pub tests_pass: bool,
    #[serde(default)]
    pub timeout: bool,
    /// Combined output, one `=== <test path> ===` section per file
    pub raw: String,
}

/// Test file covering a source file
pub fn to_test_path(path: &str, test_dir: &str) -> PathBuf {
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let base = path
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));

    base.join(test_dir).join(format!("test_{}", file_name))
}

/// Count `N failed` and `N passed` in pytest output
///
/// Takes the first occurrence of each, as in pytest's summary line
/// (`=== 1 failed, 4 passed in 0.12s ===`).
pub fn parse_pytest_counts(output: &str) -> (u32, u32) {
    (
        first_count(output, "failed").unwrap_or(0),
        first_count(output, "passed").unwrap_or(0),
    )
}

fn first_count(output: &str, keyword: &str) -> Option<u32> {
    let words: Vec<&str> = output.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        let word = pair[1].trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
        if word != keyword {
            return None;
        }
        let digits: String = pair[0]
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    })
}

/// Runs pytest for fixed files with a per-file timeout
#[derive(Debug, Clone)]
pub struct TestRunner {
    workdir: PathBuf,
    timeout: Duration,
    test_dir: String,
    program: String,
}

impl TestRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: Duration::from_secs(60),
            test_dir: "python_testcases".to_string(),
            program: "pytest".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_test_dir(mut self, test_dir: impl Into<String>) -> Self {
        self.test_dir = test_dir.into();
        self
    }

    /// Use another test command (invoked as `<program> <test path>`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run the tests for each file
    ///
    /// A timeout stops the evaluation immediately and reports no tests.
    pub async fn run(&self, files: &[String]) -> Result<EvaluationReport> {
        let mut total_failed = 0;
        let mut total_passed = 0;
        let mut sections = Vec::with_capacity(files.len());

        for file in files {
            let test_path = to_test_path(file, &self.test_dir);
            tracing::info!(file = %file, test = %test_path.display(), "Running tests");

            let mut cmd = Command::new(&self.program);
            cmd.arg(&test_path)
                .current_dir(&self.workdir)
                .env("PYTHONDONTWRITEBYTECODE", "1")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let child = cmd.spawn().map_err(|e| {
                Error::Other(format!("Failed to run {}: {}", self.program, e))
            })?;

            let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!(test = %test_path.display(), timeout = ?self.timeout, "Tests timed out");
                    sections.push(format!(
                        "=== {} ===\nTIMEOUT after {}s",
                        test_path.display(),
                        self.timeout.as_secs()
                    ));
                    return Ok(EvaluationReport {
                        tests_total: 0,
                        tests_failed: 0,
                        tests_pass: false,
                        timeout: true,
                        raw: sections.join("\n"),
                    });
                }
            };

            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));

            let (failed, passed) = parse_pytest_counts(&text);
            tracing::debug!(test = %test_path.display(), failed, passed, "Test results");
            total_failed += failed;
            total_passed += passed;
            sections.push(format!("=== {} ===\n{}", test_path.display(), text));
        }

        let total = total_failed + total_passed;
        Ok(EvaluationReport {
            tests_total: total,
            tests_failed: total_failed,
            tests_pass: total_failed == 0 && total > 0,
            timeout: false,
            raw: sections.join("\n"),
        })
    }
}

/// Executes QA snippets from a scratch directory
///
/// The repository root is put on `PYTHONPATH` and exported as `REPO_DIR`, so
/// snippets can import the code under test without running inside the
/// working copy.
#[derive(Debug, Clone)]
pub struct SnippetRunner {
    repo_dir: PathBuf,
    timeout: Duration,
}

impl SnippetRunner {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every snippet, one [`TestCase`] each
    pub async fn run_all(&self, snippets: &[CodeSnippet]) -> Vec<TestCase> {
        let mut results = Vec::with_capacity(snippets.len());
        for (i, snippet) in snippets.iter().enumerate() {
            let name = if snippet.name.trim().is_empty() {
                format!("snippet_{}", i + 1)
            } else {
                snippet.name.trim().to_string()
            };
            let (passed, output) = match self.run(snippet).await {
                Ok(outcome) => outcome,
                Err(e) => (false, e.to_string()),
            };
            tracing::info!(snippet = %name, passed, "Executed QA snippet");
            results.push(TestCase {
                name,
                passed,
                output: truncate(output),
            });
        }
        results
    }

    /// Exit status and combined output of one snippet
    async fn run(&self, snippet: &CodeSnippet) -> Result<(bool, String)> {
        let program = interpreter(&snippet.language).ok_or_else(|| {
            Error::Other(format!("Unsupported snippet language: {}", snippet.language))
        })?;
        let scratch = tempfile::TempDir::new()?;

        let mut cmd = Command::new(program);
        cmd.arg("-c")
            .arg(&snippet.code)
            .current_dir(scratch.path())
            .env("PYTHONPATH", &self.repo_dir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("REPO_DIR", &self.repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Other(format!("Failed to run {}: {}", program, e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                if !output.status.success() {
                    text.push_str(&format!("\n(exit status: {})", output.status));
                }
                Ok((output.status.success(), text))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "QA snippet timed out");
                Ok((false, format!("TIMEOUT after {}s", self.timeout.as_secs())))
            }
        }
    }
}

fn interpreter(language: &str) -> Option<&'static str> {
    match language.trim().to_ascii_lowercase().as_str() {
        "" | "python" | "python3" | "py" => Some("python3"),
        "sh" | "shell" | "bash" => Some("sh"),
        _ => None,
    }
}

fn truncate(mut output: String) -> String {
    if output.len() > MAX_SNIPPET_OUTPUT {
        let mut end = MAX_SNIPPET_OUTPUT;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        output.truncate(end);
        output.push_str("\n... (truncated)");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_test_path() {
        assert_eq!(
            to_test_path("calc.py", "python_testcases"),
            PathBuf::from("python_testcases/test_calc.py")
        );
        assert_eq!(
            to_test_path("python_programs/bitcount.py", "python_testcases"),
            PathBuf::from("python_testcases/test_bitcount.py")
        );
        assert_eq!(
            to_test_path("a/b/calc.py", "tests"),
            PathBuf::from("a/tests/test_calc.py")
        );
    }

    #[test]
    fn test_parse_pytest_counts() {
        assert_eq!(
            parse_pytest_counts("===== 1 failed, 4 passed in 0.12s ====="),
            (1, 4)
        );
        assert_eq!(parse_pytest_counts("==== 7 passed in 0.01s ===="), (0, 7));
        assert_eq!(parse_pytest_counts("collected 0 items\n"), (0, 0));
        assert_eq!(
            parse_pytest_counts("FAILED test_x.py::test_a\n=== 2 failed in 1s ==="),
            (2, 0)
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = EvaluationReport {
            tests_total: 3,
            tests_failed: 0,
            tests_pass: true,
            timeout: false,
            raw: String::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tests_pass"], true);
        assert_eq!(json["tests_total"], 3);
    }

    #[cfg(unix)]
    fn write_test(dir: &TempDir, name: &str, script: &str) {
        let tests = dir.path().join("python_testcases");
        std::fs::create_dir_all(&tests).unwrap();
        std::fs::write(tests.join(name), script).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sums_results() {
        let dir = TempDir::new().unwrap();
        write_test(&dir, "test_a.py", "echo '=== 3 passed in 0.01s ==='\n");
        write_test(&dir, "test_b.py", "echo '=== 1 failed, 2 passed in 0.02s ==='\n");

        let runner = TestRunner::new(dir.path()).with_program("sh");
        let report = runner
            .run(&["src/a.py".to_string(), "src/b.py".to_string()])
            .await
            .unwrap();

        assert_eq!(report.tests_total, 6);
        assert_eq!(report.tests_failed, 1);
        assert!(!report.tests_pass);
        assert!(!report.timeout);
        assert!(report.raw.contains("=== python_testcases/test_a.py ==="));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_passes_only_with_tests() {
        let dir = TempDir::new().unwrap();
        write_test(&dir, "test_a.py", "echo 'no tests ran'\n");

        let runner = TestRunner::new(dir.path()).with_program("sh");
        let report = runner.run(&["src/a.py".to_string()]).await.unwrap();
        assert_eq!(report.tests_total, 0);
        assert!(!report.tests_pass);

        write_test(&dir, "test_a.py", "echo '=== 2 passed ==='\n");
        let report = runner.run(&["src/a.py".to_string()]).await.unwrap();
        assert!(report.tests_pass);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout() {
        let dir = TempDir::new().unwrap();
        write_test(&dir, "test_slow.py", "sleep 5\n");
        write_test(&dir, "test_fast.py", "echo '=== 1 passed ==='\n");

        let runner = TestRunner::new(dir.path())
            .with_program("sh")
            .with_timeout(Duration::from_millis(200));
        let report = runner
            .run(&["src/slow.py".to_string(), "src/fast.py".to_string()])
            .await
            .unwrap();

        assert!(report.timeout);
        assert_eq!(report.tests_total, 0);
        assert!(!report.tests_pass);
        assert!(report.raw.contains("TIMEOUT"));
        assert!(!report.raw.contains("test_fast.py"));
    }

    fn snippet(name: &str, language: &str, code: &str) -> CodeSnippet {
        CodeSnippet {
            name: name.to_string(),
            language: language.to_string(),
            code: code.to_string(),
        }
    }

    #[test]
    fn test_interpreter() {
        assert_eq!(interpreter(""), Some("python3"));
        assert_eq!(interpreter("Python"), Some("python3"));
        assert_eq!(interpreter("bash"), Some("sh"));
        assert_eq!(interpreter("ruby"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short".to_string()), "short");
        let long = "é".repeat(MAX_SNIPPET_OUTPUT);
        let cut = truncate(long);
        assert!(cut.ends_with("... (truncated)"));
        assert!(cut.len() <= MAX_SNIPPET_OUTPUT + 20);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snippets_report_real_outcomes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("calc.py"), "def add(a, b):\n    return a - b\n").unwrap();

        let runner = SnippetRunner::new(dir.path());
        let results = runner
            .run_all(&[
                snippet("reads_repo", "sh", "cat \"$REPO_DIR/calc.py\""),
                snippet("", "sh", "echo boom >&2; exit 3"),
                snippet("rb", "ruby", "puts 1"),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].name, "reads_repo");
        assert!(results[0].passed);
        assert!(results[0].output.contains("return a - b"));

        assert_eq!(results[1].name, "snippet_2");
        assert!(!results[1].passed);
        assert!(results[1].output.contains("boom"));
        assert!(results[1].output.contains("exit status"));

        assert!(!results[2].passed);
        assert!(results[2].output.contains("Unsupported snippet language"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snippets_time_out_and_stay_out_of_repo() {
        let dir = TempDir::new().unwrap();
        let runner = SnippetRunner::new(dir.path()).with_timeout(Duration::from_millis(200));

        let results = runner
            .run_all(&[
                snippet("slow", "sh", "sleep 5"),
                snippet("scribble", "sh", "echo x > scratch.txt"),
            ])
            .await;

        assert!(!results[0].passed);
        assert!(results[0].output.starts_with("TIMEOUT"));
        assert!(results[1].passed);
        assert!(!dir.path().join("scratch.txt").exists());
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path()).with_program("/nonexistent/pytest-binary");
        assert!(runner.run(&["a.py".to_string()]).await.is_err());
    }
}
