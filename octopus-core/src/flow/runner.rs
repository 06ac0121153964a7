//! The bug detection flow: PR in, reviewed and fixed PR out

use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::machine::{PhaseValidation, StateMachine, Workflow};
use super::phase::{BugVerdict, FlowPhase};
use super::services::{PullRequestService, RepoWorkspace};
use super::state::FlowState;
use crate::config::Config;
use crate::contract::{fallback_pull_request_summary, split_summary, DEFAULT_COMMIT_MESSAGE};
use crate::crew::{Crew, CrewInputs, CrewOutput};
use crate::evaluation::TestRunner;
use crate::git::{local_fix_branch, RepoUrl};
use crate::{Error, Result};

/// Knobs for one flow run
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub base_branch: String,
    pub incremental_diff: bool,
    pub evaluate: bool,
    /// Stop after checkout and print the first prompt
    pub dry_run: bool,
    pub test_timeout: Duration,
    pub test_dir: String,
    pub test_program: String,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FlowOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_branch: config.flow.base_branch.clone(),
            incremental_diff: config.flow.incremental_diff,
            evaluate: config.flow.evaluate,
            dry_run: false,
            test_timeout: config.flow.test_timeout,
            test_dir: config.flow.test_dir.clone(),
            test_program: "pytest".to_string(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a finished flow leaves behind
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub state: FlowState,
    pub verdict: Option<BugVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crew: Option<CrewOutput>,
    pub phases: Vec<FlowPhase>,
}

/// Sequences the bug detection steps over a shared [`FlowState`]
pub struct BugDetectionFlow {
    state: FlowState,
    machine: StateMachine<FlowPhase>,
    crew: Crew,
    pull_requests: Arc<dyn PullRequestService>,
    workspace: Arc<dyn RepoWorkspace>,
    options: FlowOptions,
}

impl std::fmt::Debug for BugDetectionFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugDetectionFlow")
            .field("repo", &self.state.repo)
            .field("pr_number", &self.state.pr_number)
            .field("phase", self.machine.current_phase())
            .finish_non_exhaustive()
    }
}

impl Workflow for BugDetectionFlow {
    type Phase = FlowPhase;

    fn current_phase(&self) -> &FlowPhase {
        self.machine.current_phase()
    }

    fn can_transition_to(&self, phase: &FlowPhase) -> bool {
        self.machine.can_transition_to(phase)
    }

    fn transition_to(&mut self, phase: FlowPhase) -> Result<()> {
        self.machine.transition_to(phase)
    }

    /// The state each finished phase must have produced
    fn validate_phase(&self) -> Result<PhaseValidation> {
        let state = &self.state;
        let missing = |what: &str| PhaseValidation::NeedsWork {
            feedback: format!("{} not set after {}", what, self.current_phase()),
        };

        let validation = match self.current_phase() {
            FlowPhase::Initialize if state.pr_number == 0 => PhaseValidation::Invalid {
                reason: "Pull request number must be positive".to_string(),
            },
            FlowPhase::Initialize if state.repo_url.is_none() => missing("repo_url"),
            FlowPhase::FetchPrDetails if state.pr_details.is_none() => missing("pr_details"),
            FlowPhase::FetchPrDetails if state.pr_local_branch.is_none() => {
                missing("pr_local_branch")
            }
            FlowPhase::CloneRepository if state.repo_dir.is_none() => missing("repo_dir"),
            FlowPhase::FetchDiff if state.pr_diff.is_none() => missing("pr_diff"),
            FlowPhase::DetectBugs if state.bug_present && state.pull_request_summary.is_none() => {
                missing("pull_request_summary")
            }
            FlowPhase::CreatePullRequest
                if state.created_pull_request.is_none() && state.pull_request_error.is_none() =>
            {
                missing("created_pull_request")
            }
            _ => PhaseValidation::Valid,
        };
        Ok(validation)
    }
}

impl BugDetectionFlow {
    pub fn new(
        state: FlowState,
        crew: Crew,
        pull_requests: Arc<dyn PullRequestService>,
        workspace: Arc<dyn RepoWorkspace>,
        options: FlowOptions,
    ) -> Self {
        Self {
            state,
            machine: FlowPhase::state_machine(),
            crew,
            pull_requests,
            workspace,
            options,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Validate the finished phase, then move on
    fn advance(&mut self, next: FlowPhase) -> Result<()> {
        self.validate_phase()?.into_result()?;
        self.transition_to(next)
    }

    fn phases(&self) -> Vec<FlowPhase> {
        let mut phases = vec![FlowPhase::Initialize];
        phases.extend(self.machine.history().iter().map(|(_, to)| *to));
        phases
    }

    /// Run the flow to completion
    ///
    /// Any failing step moves the flow to `Failed` and returns its error.
    pub async fn run(mut self) -> Result<FlowReport> {
        match self.run_steps().await {
            Ok((verdict, crew)) => Ok(FlowReport {
                phases: self.phases(),
                state: self.state,
                verdict,
                crew,
            }),
            Err(e) => {
                tracing::error!(phase = %self.current_phase(), error = %e, "Flow failed");
                if self.can_transition_to(&FlowPhase::Failed) {
                    self.transition_to(FlowPhase::Failed)?;
                }
                Err(e)
            }
        }
    }

    async fn run_steps(&mut self) -> Result<(Option<BugVerdict>, Option<CrewOutput>)> {
        self.initialize()?;
        self.advance(FlowPhase::FetchPrDetails)?;
        self.get_pr_details().await?;
        self.advance(FlowPhase::CloneRepository)?;
        self.clone_repository().await?;
        self.advance(FlowPhase::FetchDiff)?;
        self.fetch_diff().await?;
        self.advance(FlowPhase::CheckoutBranch)?;
        self.checkout_branch().await?;

        if self.options.dry_run {
            let prompt = self.crew.preview_prompt(&self.crew_inputs()?)?;
            println!("Dry run: prompt for the first task\n{}", prompt);
            self.advance(FlowPhase::Complete)?;
            return Ok((None, None));
        }

        self.advance(FlowPhase::DetectBugs)?;
        let (verdict, output) = self.detect_bugs().await?;
        self.advance(verdict.next_phase())?;

        match verdict {
            BugVerdict::BugsFound => {
                self.create_pull_request().await?;
                self.advance(FlowPhase::Evaluate)?;
                self.evaluate().await?;
            }
            BugVerdict::NoBugsFound => {
                println!("No bugs found, skipping pull request creation.");
            }
        }
        self.advance(FlowPhase::Complete)?;

        Ok((Some(verdict), Some(output)))
    }

    fn initialize(&mut self) -> Result<()> {
        println!("Initializing Bug Detection Flow...");
        println!("{}", self.state.to_pretty_json());

        let url = RepoUrl::parse(&self.state.repo)?;
        self.state.repo = url.slug();
        self.state.repo_url = Some(url.https_url());
        Ok(())
    }

    async fn get_pr_details(&mut self) -> Result<()> {
        let details = self
            .pull_requests
            .get_pull_request_details(&self.state.repo, self.state.pr_number)
            .await?;
        let branch = local_fix_branch(self.state.pr_number, Local::now());

        println!("Pull Request Details: {}", details.to_prompt()?);
        tracing::info!(pr = details.number, title = %details.title, branch = %branch, "Fetched pull request");

        self.state.pr_details = Some(details);
        self.state.pr_local_branch = Some(branch);
        Ok(())
    }

    async fn clone_repository(&mut self) -> Result<()> {
        let url = require(&self.state.repo_url, "repo_url")?.clone();
        println!("Cloning repository: {}", url);

        let repo_dir = self.workspace.clone_repository(&url).await?;
        tracing::info!(dir = %repo_dir.display(), "Repository cloned");
        self.state.repo_dir = Some(repo_dir);
        Ok(())
    }

    async fn fetch_diff(&mut self) -> Result<()> {
        let repo_dir = require(&self.state.repo_dir, "repo_dir")?.clone();
        let branch = require(&self.state.pr_local_branch, "pr_local_branch")?.clone();

        let diff = self
            .workspace
            .fetch_diff(
                &repo_dir,
                self.state.pr_number,
                &branch,
                &self.options.base_branch,
                self.options.incremental_diff,
            )
            .await?;

        println!("{} Diff {}", ">".repeat(30), ">".repeat(30));
        println!("{}", diff);
        println!("{} Diff {}", "<".repeat(30), "<".repeat(30));

        self.state.pr_diff = Some(diff);
        Ok(())
    }

    async fn checkout_branch(&mut self) -> Result<()> {
        let repo_dir = require(&self.state.repo_dir, "repo_dir")?.clone();
        let branch = require(&self.state.pr_local_branch, "pr_local_branch")?.clone();
        println!("Checking out PR branch: {}", branch);
        self.workspace.checkout(&repo_dir, &branch).await
    }

    fn crew_inputs(&self) -> Result<CrewInputs> {
        let details = require(&self.state.pr_details, "pr_details")?;
        Ok(CrewInputs {
            pr_number: self.state.pr_number,
            pr_details: details.to_prompt()?,
            diff: require(&self.state.pr_diff, "pr_diff")?.clone(),
            repo_dir: require(&self.state.repo_dir, "repo_dir")?.clone(),
            branch: require(&self.state.pr_local_branch, "pr_local_branch")?.clone(),
            requirement_id: self.state.requirement_id.clone(),
        })
    }

    async fn detect_bugs(&mut self) -> Result<(BugVerdict, CrewOutput)> {
        let inputs = self.crew_inputs()?;
        let mut output = self.crew.kickoff(&inputs).await?;
        println!("Crew executed time: {:.3} ms", output.elapsed_ms());

        let result = &mut output.result;
        if self.workspace.has_changes(&inputs.repo_dir).await? {
            let message = result
                .commit_message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(DEFAULT_COMMIT_MESSAGE)
                .to_string();
            result.commit_hash = self
                .workspace
                .commit_and_push(&inputs.repo_dir, &inputs.branch, &message)
                .await?;
            tracing::info!(commit = ?result.commit_hash, branch = %inputs.branch, "Pushed fixes");
        }
        if result
            .pull_request_summary
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
        {
            result.pull_request_summary = Some(fallback_pull_request_summary(result));
        }

        self.state.pull_request_summary = result.pull_request_summary.clone();
        self.state.bug_present = result.bugs_found;
        self.state.fixed_files = result.fixed_files();
        self.state.commit_hash = result.commit_hash.clone();

        println!("Final State: {}", self.state.to_pretty_json());
        println!("Crew Raw Output: {}", output.raw);
        println!(
            "Crew Result Model: {}",
            serde_json::to_string_pretty(&output.result)?
        );
        println!("{} Crew Token Usage {}", "*".repeat(30), "*".repeat(30));
        println!("{}", serde_json::to_string(&output.usage)?);
        print!("{}", statistics_block(&inputs.branch, &output));

        let verdict = BugVerdict::from_bugs_found(self.state.bug_present);
        tracing::info!(%verdict, fixed_files = ?self.state.fixed_files, "Bug detection finished");
        Ok((verdict, output))
    }

    /// Open the follow-up pull request
    ///
    /// A branch that was never pushed, or a rejection from the service, is
    /// recorded in `pull_request_error` and the flow goes on to evaluation.
    async fn create_pull_request(&mut self) -> Result<()> {
        let summary = require(&self.state.pull_request_summary, "pull_request_summary")?.clone();
        let head = require(&self.state.pr_local_branch, "pr_local_branch")?.clone();

        if self.state.commit_hash.is_none() {
            let reason = format!("No fixes were pushed to {}", head);
            println!("{}, skipping pull request creation.", reason);
            tracing::warn!(branch = %head, "Bugs found but nothing was committed");
            self.state.pull_request_error = Some(reason);
            return Ok(());
        }

        println!("Creating pull request with summary: {}", summary);
        let (title, body) = split_summary(&summary);
        let created = self
            .pull_requests
            .create_pull_request(
                &self.state.repo,
                &title,
                &body,
                &head,
                &self.state.target_branch,
            )
            .await;

        match created {
            Ok(created) => {
                println!("Pull Request created result: #{} {}", created.number, created.url);
                self.state.created_pull_request = Some(created);
            }
            Err(e) => {
                println!("Pull Request created result: {}", e);
                tracing::error!(branch = %head, error = %e, "Failed to create pull request");
                self.state.pull_request_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    async fn evaluate(&mut self) -> Result<()> {
        println!("Evaluating the results of the bug detection flow...");
        if !self.options.evaluate {
            tracing::info!("Evaluation disabled");
            return Ok(());
        }
        if !self.state.bug_present || self.state.fixed_files.is_empty() {
            println!("No bugs found or fixed files.");
            return Ok(());
        }

        let repo_dir = require(&self.state.repo_dir, "repo_dir")?.clone();
        let report = TestRunner::new(repo_dir)
            .with_timeout(self.options.test_timeout)
            .with_test_dir(self.options.test_dir.clone())
            .with_program(self.options.test_program.clone())
            .run(&self.state.fixed_files)
            .await?;

        println!("Pytest Result: {}", serde_json::to_string_pretty(&report)?);
        if report.tests_pass {
            println!("All tests passed.");
        } else {
            println!("Some tests failed.");
        }
        self.state.evaluation = Some(report);
        Ok(())
    }
}

fn require<'a, T>(value: &'a Option<T>, name: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| Error::Flow(format!("{} is not set", name)))
}

/// The statistics printed after bug detection
pub fn statistics_block(branch: &str, output: &CrewOutput) -> String {
    let usage = &output.usage;
    format!(
        "{open} Important Statistics {open}\n\
         Code Fix Branch: {branch}\n\
         Crew Elapsed Time (ms): {elapsed:.3}\n\
         Total Tokens: {total}\n\
         Input Tokens: {input}\n\
         Cached Tokens: {cached}\n\
         Output Tokens: {output_tokens}\n\
         Successful Requests: {requests}\n\
         {close} Important Statistics {close}\n",
        open = ">".repeat(30),
        close = "<".repeat(30),
        branch = branch,
        elapsed = output.elapsed_ms(),
        total = usage.total_tokens,
        input = usage.prompt_tokens,
        cached = usage.cached_prompt_tokens,
        output_tokens = usage.completion_tokens,
        requests = usage.successful_requests,
    )
}
