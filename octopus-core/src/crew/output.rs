//! Results of a crew run

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::agent::{AgentRole, TokenUsage};
use crate::contract::CrewResult;
use crate::Result;

/// Record of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub name: String,
    pub role: AgentRole,
    /// Gate was closed; the task never ran
    pub skipped: bool,
    /// Last raw answer from the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Parsed answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
    pub attempts: u32,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

impl TaskOutput {
    pub fn skipped(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
            skipped: true,
            raw: None,
            parsed: None,
            attempts: 0,
            usage: TokenUsage::default(),
            elapsed_ms: 0,
        }
    }
}

/// Everything a crew run produced
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutput {
    pub result: CrewResult,
    /// Raw text of the answer the result was parsed from
    pub raw: String,
    pub usage: TokenUsage,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub task_outputs: Vec<TaskOutput>,
}

impl CrewOutput {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Names of the tasks that ran
    pub fn completed_tasks(&self) -> Vec<&str> {
        self.task_outputs
            .iter()
            .filter(|t| !t.skipped)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Write the run as pretty JSON
    pub fn write_log(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Wrote crew output log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("crew.json");

        let output = CrewOutput {
            result: CrewResult {
                bugs_found: true,
                ..CrewResult::default()
            },
            raw: "{}".to_string(),
            usage: TokenUsage::default(),
            elapsed: Duration::from_millis(1500),
            task_outputs: vec![
                TaskOutput::skipped("fix", AgentRole::Developer),
                TaskOutput {
                    attempts: 1,
                    skipped: false,
                    ..TaskOutput::skipped("review", AgentRole::Reviewer)
                },
            ],
        };
        output.write_log(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["result"]["bugs_found"], true);
        assert_eq!(written["elapsed"], "1s 500ms");
        assert_eq!(written["task_outputs"][0]["skipped"], true);
        assert!(written["task_outputs"][0].get("raw").is_none());

        assert_eq!(output.completed_tasks(), vec!["review"]);
        assert_eq!(output.elapsed_ms(), 1500.0);
    }
}
