//! Tasks a crew executes and the gates that decide whether they run

use serde::{Deserialize, Serialize};

use crate::agent::AgentRole;

/// What a task produces, and so how its output is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reviewer hypothesizes bugs (`ReviewReport`)
    Review,
    /// QA checks the hypotheses (`QaReport`)
    Verify,
    /// Developer fixes confirmed bugs (`FixReport`)
    Fix,
    /// QA checks the fixes (`QaReport`)
    Reverify,
    /// Git specialist writes commit message and PR summary (`GitSummary`)
    Summarize,
}

/// Condition under which a task runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskGate {
    #[default]
    Always,
    /// Bugs were found and confirmed so far
    WhenBugsFound,
    /// Bugs were found and the developer changed files
    WhenChangesApplied,
}

/// Progress a gate is evaluated against
#[derive(Debug, Clone, Copy, Default)]
pub struct GateState {
    pub bugs_found: bool,
    pub changes_applied: bool,
}

impl TaskGate {
    pub fn allows(&self, state: GateState) -> bool {
        match self {
            TaskGate::Always => true,
            TaskGate::WhenBugsFound => state.bugs_found,
            TaskGate::WhenChangesApplied => state.bugs_found && state.changes_applied,
        }
    }
}

/// A single LLM invocation in a sequential crew
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub role: AgentRole,
    pub stage: Stage,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub gate: TaskGate,
}

const STRICT_JSON: &str = "STRICT JSON ONLY (no code fences, no prose) matching the output format above.";

impl Task {
    pub fn new(name: impl Into<String>, role: AgentRole, stage: Stage) -> Self {
        Self {
            name: name.into(),
            role,
            stage,
            description: String::new(),
            expected_output: STRICT_JSON.to_string(),
            gate: TaskGate::Always,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_gate(mut self, gate: TaskGate) -> Self {
        self.gate = gate;
        self
    }

    /// The default sequential pipeline
    ///
    /// review → verify → fix → re-verify → summarize
    pub fn default_pipeline() -> Vec<Task> {
        vec![
            Task::new("review", AgentRole::Reviewer, Stage::Review)
                .with_description("Analyze the pull request diff for functional bugs."),
            Task::new("qa", AgentRole::Qa, Stage::Verify).with_description(
                "Verify the reviewer's bug hypotheses against the original code. \
                 If no bugs were reported, consider whether tests are needed to \
                 confirm the functionality works as intended.",
            ),
            Task::new("fix", AgentRole::Developer, Stage::Fix)
                .with_description("Fix the bugs QA confirmed using minimal changes.")
                .with_gate(TaskGate::WhenBugsFound),
            Task::new("qa_reverify", AgentRole::Qa, Stage::Reverify)
                .with_description(
                    "Verify the developer's fixes. The code shown is the fixed code. \
                     Approve only if every confirmed bug is resolved.",
                )
                .with_gate(TaskGate::WhenChangesApplied),
            Task::new("git", AgentRole::GitSpecialist, Stage::Summarize)
                .with_description("Write the commit message and pull request description.")
                .with_gate(TaskGate::WhenChangesApplied),
        ]
    }
}
