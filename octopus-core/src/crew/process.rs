//! Crew execution: sequential pipelines and manager-led runs

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::output::{CrewOutput, TaskOutput};
use super::task::{GateState, Stage, Task};
use crate::agent::{
    tools, AgentRequest, AgentRole, Backend, PromptBuilder, PromptContext, TokenUsage,
};
use crate::config::{Config, ProcessKind, ResolvedSettings};
use crate::contract::{
    parse_json_strict, CrewResult, FixApplied, FixReport, GitSummary, QaReport, ReviewReport,
};
use crate::evaluation::SnippetRunner;
use crate::{Error, Result};

/// What the crew is asked to work on
#[derive(Debug, Clone)]
pub struct CrewInputs {
    pub pr_number: u64,
    /// Pull request details, rendered for the prompt
    pub pr_details: String,
    pub diff: String,
    pub repo_dir: PathBuf,
    /// Branch the fixes land on
    pub branch: String,
    /// Requirement the pull request implements, if known
    pub requirement_id: Option<String>,
}

/// A group of role-playing agents sharing one backend
pub struct Crew {
    backend: Arc<dyn Backend>,
    settings: HashMap<AgentRole, ResolvedSettings>,
    process: ProcessKind,
    max_retries: u32,
    ignored_dirs: Vec<String>,
    tasks: Vec<Task>,
    output_log: Option<PathBuf>,
    /// Per-snippet timeout; `None` leaves QA snippets unexecuted
    snippet_timeout: Option<Duration>,
}

impl std::fmt::Debug for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crew")
            .field("backend", &self.backend.name())
            .field("process", &self.process)
            .field("max_retries", &self.max_retries)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Parsed outputs accumulated over a sequential run
#[derive(Default)]
struct Progress {
    gate: GateState,
    review: Option<ReviewReport>,
    verification: Option<QaReport>,
    reverification: Option<QaReport>,
    fixes: Vec<FixApplied>,
    summary: GitSummary,
    /// (heading, JSON) of every finished task, fed to later prompts
    prior: Vec<(String, String)>,
    involved: Vec<String>,
}

impl Progress {
    fn record<T: Serialize>(&mut self, task: &Task, value: &T, output: &mut TaskOutput) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.prior.push((
            format!("{} ({})", task.role.title(), task.name),
            serde_json::to_string_pretty(&json)?,
        ));
        output.parsed = Some(json);

        let title = task.role.title().to_string();
        if !self.involved.contains(&title) {
            self.involved.push(title);
        }
        Ok(())
    }
}

impl Crew {
    pub fn from_config(config: &Config, backend: Arc<dyn Backend>) -> Self {
        let settings = AgentRole::all()
            .iter()
            .map(|role| (*role, config.settings_for(*role)))
            .collect();

        Self {
            backend,
            settings,
            process: config.agent.process,
            max_retries: config.agent.max_retries,
            ignored_dirs: config.flow.ignored_dirs.clone(),
            tasks: Task::default_pipeline(),
            output_log: config.flow.output_log.clone(),
            snippet_timeout: config
                .agent
                .run_snippets
                .then_some(config.agent.snippet_timeout),
        }
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    /// Replace the sequential pipeline
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_output_log(mut self, path: Option<PathBuf>) -> Self {
        self.output_log = path;
        self
    }

    pub fn with_snippet_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.snippet_timeout = timeout;
        self
    }

    pub fn process(&self) -> ProcessKind {
        self.process
    }

    /// Run the crew to completion
    pub async fn kickoff(&self, inputs: &CrewInputs) -> Result<CrewOutput> {
        let started = Instant::now();
        tracing::info!(
            process = %self.process,
            backend = self.backend.name(),
            pr = inputs.pr_number,
            "Crew kickoff"
        );

        let (result, raw, task_outputs) = match self.process {
            ProcessKind::Sequential => self.run_sequential(inputs).await?,
            ProcessKind::Hierarchical => self.run_hierarchical(inputs).await?,
        };

        let mut usage = TokenUsage::default();
        for output in &task_outputs {
            usage.add(&output.usage);
        }

        let output = CrewOutput {
            result,
            raw,
            usage,
            elapsed: started.elapsed(),
            task_outputs,
        };

        if let Some(ref path) = self.output_log {
            if let Err(e) = output.write_log(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write crew output log");
            }
        }

        Ok(output)
    }

    /// The first prompt the crew would send, for dry runs
    pub fn preview_prompt(&self, inputs: &CrewInputs) -> Result<String> {
        let context = self.base_context(inputs)?;
        match self.process {
            ProcessKind::Sequential => {
                let task = self
                    .tasks
                    .first()
                    .ok_or_else(|| Error::Config("Crew has no tasks".to_string()))?;
                Ok(task_prompt(task, &context, &[]).build())
            }
            ProcessKind::Hierarchical => {
                let context = context
                    .with_team(AgentRole::specialists())
                    .with_plan("(produced by the planning pass)");
                Ok(PromptBuilder::with_context(AgentRole::Manager, context).build())
            }
        }
    }

    fn base_context(&self, inputs: &CrewInputs) -> Result<PromptContext> {
        let listing = tools::list_directory(&inputs.repo_dir, &self.ignored_dirs)?;
        let files = relevant_files(&inputs.repo_dir, &inputs.diff, &[]);

        Ok(PromptContext::new()
            .with_pull_request(inputs.pr_number, inputs.pr_details.clone())
            .with_requirement(inputs.requirement_id.as_deref())
            .with_diff(inputs.diff.clone())
            .with_repo(inputs.repo_dir.display().to_string(), inputs.branch.clone())
            .with_file_listing(listing)
            .with_file_contents(&files))
    }

    fn request(&self, prompt: &PromptBuilder, workdir: &Path) -> AgentRequest {
        let role = prompt.role();
        let settings = self.settings.get(&role).cloned().unwrap_or(ResolvedSettings {
            model: String::new(),
            temperature: None,
            top_p: None,
        });

        AgentRequest {
            role,
            system: prompt.system(),
            prompt: prompt.build(),
            workdir: workdir.to_path_buf(),
            model: settings.model,
            temperature: settings.temperature,
            top_p: settings.top_p,
        }
    }

    /// Call the backend until the answer parses, up to `max_retries` retries
    async fn attempt<T>(
        &self,
        name: &str,
        request: &AgentRequest,
        parse: fn(&str) -> Result<T>,
    ) -> Result<(T, TaskOutput)> {
        let started = Instant::now();
        let attempts = self.max_retries + 1;
        let mut usage = TokenUsage::default();
        let mut last_error = None;

        for attempt in 1..=attempts {
            tracing::debug!(task = name, role = %request.role, model = %request.model, attempt, "Invoking agent");

            let output = match self.backend.run(request).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(task = name, attempt, error = %e, "Agent call failed");
                    last_error = Some(e);
                    continue;
                }
            };
            usage.add(&output.usage);

            match parse(&output.text) {
                Ok(value) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        task = name,
                        role = %request.role,
                        backend = self.backend.name(),
                        model = %request.model,
                        attempt,
                        elapsed_ms,
                        "Task completed"
                    );
                    let record = TaskOutput {
                        name: name.to_string(),
                        role: request.role,
                        skipped: false,
                        raw: Some(output.text),
                        parsed: None,
                        attempts: attempt,
                        usage,
                        elapsed_ms,
                    };
                    return Ok((value, record));
                }
                Err(e) => {
                    tracing::warn!(task = name, attempt, error = %e, "Agent answer rejected");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Agent(format!(
            "Task '{}' failed after {} attempts: {}",
            name,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Execute QA's snippets and add their real outcomes to its tests
    async fn execute_snippets(&self, report: &mut QaReport, workdir: &Path) {
        let Some(timeout) = self.snippet_timeout else {
            return;
        };
        if report.snippets.is_empty() {
            return;
        }

        let results = SnippetRunner::new(workdir)
            .with_timeout(timeout)
            .run_all(&report.snippets)
            .await;
        let failed = results.iter().filter(|t| !t.passed).count();
        tracing::info!(snippets = results.len(), failed, "QA snippets executed");
        report.tests.extend(results);
    }

    async fn run_task<T: DeserializeOwned>(
        &self,
        task: &Task,
        context: &PromptContext,
        progress: &Progress,
        workdir: &Path,
    ) -> Result<(T, TaskOutput)> {
        let prompt = task_prompt(task, context, &progress.prior);
        let request = self.request(&prompt, workdir);
        self.attempt(&task.name, &request, parse_json_strict::<T>).await
    }

    async fn run_sequential(
        &self,
        inputs: &CrewInputs,
    ) -> Result<(CrewResult, String, Vec<TaskOutput>)> {
        let mut context = self.base_context(inputs)?;
        let mut progress = Progress::default();
        let mut outputs = Vec::with_capacity(self.tasks.len());
        let workdir = inputs.repo_dir.as_path();

        for task in &self.tasks {
            if !task.gate.allows(progress.gate) {
                tracing::info!(task = %task.name, gate = ?task.gate, "Skipping task");
                outputs.push(TaskOutput::skipped(&task.name, task.role));
                continue;
            }

            let output = match task.stage {
                Stage::Review => {
                    let (report, mut output) = self
                        .run_task::<ReviewReport>(task, &context, &progress, workdir)
                        .await?;
                    progress.record(task, &report, &mut output)?;
                    progress.gate.bugs_found = report.bugs_found;
                    progress.review = Some(report);
                    output
                }
                Stage::Verify => {
                    let (mut report, mut output) = self
                        .run_task::<QaReport>(task, &context, &progress, workdir)
                        .await?;
                    self.execute_snippets(&mut report, workdir).await;
                    progress.record(task, &report, &mut output)?;
                    progress.gate.bugs_found = report.bugs_confirmed;
                    progress.verification = Some(report);
                    output
                }
                Stage::Fix => {
                    let (report, mut output) = self
                        .run_task::<FixReport>(task, &context, &progress, workdir)
                        .await?;
                    progress.record(task, &report, &mut output)?;

                    let written = tools::apply_file_edits(workdir, &report.edits)?;
                    let mut fixes = report.fixes_applied;
                    if fixes.is_empty() {
                        fixes = written
                            .iter()
                            .map(|path| FixApplied {
                                file: Some(path.display().to_string()),
                                summary: None,
                            })
                            .collect();
                    }
                    progress.gate.changes_applied = !written.is_empty() || !fixes.is_empty();
                    progress.fixes = fixes;

                    // Later tasks see the fixed code
                    let files = relevant_files(workdir, &inputs.diff, &written);
                    context = context.with_file_contents(&files);
                    output
                }
                Stage::Reverify => {
                    let (mut report, mut output) = self
                        .run_task::<QaReport>(task, &context, &progress, workdir)
                        .await?;
                    self.execute_snippets(&mut report, workdir).await;
                    progress.record(task, &report, &mut output)?;
                    if !report.approved {
                        tracing::warn!(feedback = %report.feedback, "QA did not approve the fixes");
                    }
                    progress.reverification = Some(report);
                    output
                }
                Stage::Summarize => {
                    let (summary, mut output) = self
                        .run_task::<GitSummary>(task, &context, &progress, workdir)
                        .await?;
                    progress.record(task, &summary, &mut output)?;
                    progress.summary = summary;
                    output
                }
            };

            outputs.push(output);
        }

        let workflow_steps_completed = outputs
            .iter()
            .filter(|o| !o.skipped)
            .map(|o| o.name.clone())
            .collect();

        let result = CrewResult {
            bugs_found: progress.gate.bugs_found,
            review_results: Some(serde_json::json!({
                "review": progress.review,
                "qa": progress.verification,
                "qa_reverify": progress.reverification,
            })),
            fixes_applied: progress.fixes,
            commit_message: progress.summary.commit_message,
            commit_hash: None,
            pull_request_summary: progress.summary.pull_request_summary,
            involved_agents: progress.involved,
            workflow_steps_completed,
            edits: Vec::new(),
        };

        let raw = serde_json::to_string_pretty(&result)?;
        Ok((result, raw, outputs))
    }

    async fn run_hierarchical(
        &self,
        inputs: &CrewInputs,
    ) -> Result<(CrewResult, String, Vec<TaskOutput>)> {
        let workdir = inputs.repo_dir.as_path();
        let context = self.base_context(inputs)?.with_team(AgentRole::specialists());
        let mut outputs = Vec::with_capacity(2);

        let plan_request = self.request(
            &PromptBuilder::with_context(AgentRole::Planner, context.clone()),
            workdir,
        );
        let plan = match self
            .attempt("planning", &plan_request, |text| Ok(text.trim().to_string()))
            .await
        {
            Ok((plan, output)) => {
                outputs.push(output);
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planning failed, continuing without a plan");
                "(no plan available)".to_string()
            }
        };

        let context = context.with_plan(plan);
        let request = self.request(
            &PromptBuilder::with_context(AgentRole::Manager, context),
            workdir,
        );
        let (mut result, mut output) = self
            .attempt("bug_detection_and_fix", &request, parse_json_strict::<CrewResult>)
            .await?;

        let written = tools::apply_file_edits(workdir, &result.edits)?;
        if result.fixes_applied.is_empty() && !written.is_empty() {
            result.fixes_applied = written
                .iter()
                .map(|path| FixApplied {
                    file: Some(path.display().to_string()),
                    summary: None,
                })
                .collect();
        }
        if result.involved_agents.is_empty() {
            result.involved_agents.push(AgentRole::Manager.title().to_string());
        }

        let raw = output.raw.clone().unwrap_or_default();
        output.parsed = Some(serde_json::to_value(&result)?);
        outputs.push(output);

        Ok((result, raw, outputs))
    }
}

/// A sequential task's prompt, with earlier task outputs as context
fn task_prompt(task: &Task, context: &PromptContext, prior: &[(String, String)]) -> PromptBuilder {
    PromptBuilder::with_context(task.role, context.clone())
        .prior_work(prior)
        .var("TASK_DESCRIPTION", task.description.clone())
        .expected_output(task.expected_output.clone())
}

/// Files the diff touches plus any extra paths, with their current contents
fn relevant_files(root: &Path, diff: &str, extra: &[PathBuf]) -> Vec<(String, String)> {
    let mut files = tools::read_changed_files(root, diff);
    for path in extra {
        let name = path.display().to_string();
        if files.iter().any(|(f, _)| *f == name) {
            continue;
        }
        if let Ok(content) = tools::read_file(root, &name) {
            files.push((name, content));
        }
    }
    files
}
