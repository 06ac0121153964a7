//! JSON exchanged between agent stages
//!
//! Agents are asked for strict JSON but routinely wrap it in code fences or
//! surround it with prose. [`parse_json_strict`] tolerates both.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Commit message used when no agent provided one
pub const DEFAULT_COMMIT_MESSAGE: &str = "fix: apply bug fixes detected by automated review";

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the language tag (letters only) and the newline after it
    let lang_len = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let rest = &rest[lang_len..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest).trim();

    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse agent output as JSON
///
/// Tries the fence-stripped text first, then the span from the first `{` to
/// the last `}`.
pub fn parse_json_strict<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let text = strip_code_fence(raw);

    let first_error = match serde_json::from_str::<T>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(Error::Contract(format!(
                "agent output is not JSON: {}",
                first_error
            )))
        }
    };

    serde_json::from_str::<T>(span)
        .map_err(|e| Error::Contract(format!("agent output is not valid JSON: {}", e)))
}

/// One fix reported by the team
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixApplied {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Full replacement content for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

/// Final result of a crew run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewResult {
    pub bugs_found: bool,
    #[serde(default)]
    pub review_results: Option<serde_json::Value>,
    #[serde(default)]
    pub fixes_applied: Vec<FixApplied>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub pull_request_summary: Option<String>,
    #[serde(default)]
    pub involved_agents: Vec<String>,
    #[serde(default)]
    pub workflow_steps_completed: Vec<String>,
    /// File contents to write, when the backend cannot edit files itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<FileEdit>,
}

impl CrewResult {
    /// Files named by the reported fixes
    pub fn fixed_files(&self) -> Vec<String> {
        self.fixes_applied
            .iter()
            .filter_map(|f| f.file.as_deref())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A suspected bug
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Reviewer output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub bugs_found: bool,
    #[serde(default)]
    pub bugs: Vec<BugReport>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub output: String,
}

/// Code QA wants executed rather than reasoned about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    #[serde(default)]
    pub name: String,
    /// `python` (default) or `sh`
    #[serde(default)]
    pub language: String,
    pub code: String,
}

/// QA output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaReport {
    pub bugs_confirmed: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub tests: Vec<TestCase>,
    #[serde(default)]
    pub snippets: Vec<CodeSnippet>,
    #[serde(default)]
    pub feedback: String,
}

/// Developer output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    #[serde(default)]
    pub fixes_applied: Vec<FixApplied>,
    #[serde(default)]
    pub edits: Vec<FileEdit>,
}

/// Git specialist output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSummary {
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub pull_request_summary: Option<String>,
}

/// PR summary used when the team did not write one
pub fn fallback_pull_request_summary(result: &CrewResult) -> String {
    let title = if result.bugs_found {
        "fix: apply minimal bug fixes"
    } else {
        "chore: no functional bugs found"
    };

    let mut lines = vec![format!("**Bugs found:** {}", result.bugs_found)];
    if let Some(ref hash) = result.commit_hash {
        lines.push(format!("**Commit:** `{}`", hash));
    }
    lines.push("### Fixes:".to_string());
    for fix in &result.fixes_applied {
        lines.push(format!(
            "- {} — {}",
            fix.file.as_deref().unwrap_or("(unknown)"),
            fix.summary.as_deref().unwrap_or("updated")
        ));
    }

    format!("{}\n\n{}", title, lines.join("\n"))
}

/// Split a PR summary into title (first non-empty line) and body
pub fn split_summary(summary: &str) -> (String, String) {
    let trimmed = summary.trim_start();
    match trimmed.split_once('\n') {
        Some((title, body)) => (title.trim().to_string(), body.trim().to_string()),
        None => (trimmed.trim().to_string(), String::new()),
    }
}
