//! Run command - launch an agent workflow against a pull request

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use crossterm::style::{StyledContent, Stylize};
use octopus_core::agent::BackendRegistry;
use octopus_core::config::ProcessKind;
use octopus_core::crew::Crew;
use octopus_core::flow::GitWorkspace;
use octopus_core::git::RepoUrl;
use octopus_core::{BugDetectionFlow, Config, FlowOptions, FlowState, Secrets};
use octopus_github::GitHubClient;

const BANNER: &str = r#"
     ██████   ██████ ████████  ██████  ██████  ██    ██ ███████      █████  ██
    ██    ██ ██         ██    ██    ██ ██   ██ ██    ██ ██          ██   ██ ██
    ██    ██ ██         ██    ██    ██ ██████  ██    ██ ███████     ███████ ██
    ██    ██ ██         ██    ██    ██ ██      ██    ██      ██     ██   ██ ██
     ██████   ██████    ██     ██████  ██       ██████  ███████     ██   ██ ██

    OCTOPUS AI
    The intelligent tentacles of AI
"#;

fn styled_banner() -> StyledContent<&'static str> {
    BANNER.bold().yellow()
}

/// Print the banner in bold bright yellow
pub fn print_banner() {
    println!("{}", styled_banner());
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommand,
}

#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Review a pull request, fix its bugs and open a follow-up pull request
    Bug(BugArgs),
}

#[derive(Args, Debug)]
pub struct BugArgs {
    /// Repository (owner/repo, URL, or pull request URL)
    pub repo: String,

    /// Pull request number (taken from a pull request URL when omitted)
    #[arg(long)]
    pub pr: Option<u64>,

    /// Requirement ID for the pull request
    #[arg(short = 'r', long)]
    pub requirement: Option<String>,

    /// Branch the follow-up pull request targets
    #[arg(long)]
    pub target_branch: Option<String>,

    /// Branch the pull request diff is computed against
    #[arg(long)]
    pub base_branch: Option<String>,

    /// Crew process (sequential or hierarchical)
    #[arg(long)]
    pub process: Option<ProcessKind>,

    /// Skip running the fixed files' tests
    #[arg(long)]
    pub no_evaluate: bool,

    /// Stop after checking out the branch and print the first prompt
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        print_banner();
        match &self.command {
            RunCommand::Bug(args) => args.execute(verbose, config).await,
        }
    }
}

impl BugArgs {
    /// Configuration with this command's flags applied
    fn effective_config(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(ref branch) = self.target_branch {
            config.flow.target_branch = branch.clone();
        }
        if let Some(ref branch) = self.base_branch {
            config.flow.base_branch = branch.clone();
        }
        if let Some(process) = self.process {
            config.agent.process = process;
        }
        if self.no_evaluate {
            config.flow.evaluate = false;
        }
        config
    }

    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let config = self.effective_config(config);
        let (repo, pr_number) = parse_target(&self.repo, self.pr)?;

        println!("Running Bug Detection Workflow...");
        println!("Repository: {}  Pull request: #{}", repo, pr_number);
        if let Some(ref requirement) = self.requirement {
            println!("Requirement: {}", requirement);
        }

        let secrets = Secrets::load()?;
        let registry = BackendRegistry::from_config(&config, secrets.llm_api_key())?;
        let backend = registry.get_by_kind(config.agent.backend).with_context(|| {
            format!(
                "Backend '{}' is not configured (set OPENAI_API_KEY or use --backend claude)",
                config.agent.backend
            )
        })?;
        if !backend.is_available() {
            bail!("Backend '{}' is not available on this system", backend.name());
        }

        let github = GitHubClient::from_url(&repo)?;
        let workspace_dir = config.flow.workspace_dir()?;
        std::fs::create_dir_all(&workspace_dir)
            .with_context(|| format!("Failed to create {}", workspace_dir.display()))?;

        if verbose {
            tracing::info!(
                backend = backend.name(),
                process = %config.agent.process,
                workspace = %workspace_dir.display(),
                target_branch = %config.flow.target_branch,
                "Starting bug detection"
            );
        }

        let crew = Crew::from_config(&config, backend);
        let state = FlowState::new(repo, pr_number, config.flow.target_branch.clone())
            .with_requirement(self.requirement.clone());
        let flow = BugDetectionFlow::new(
            state,
            crew,
            Arc::new(github),
            Arc::new(GitWorkspace::new(workspace_dir)),
            FlowOptions::from_config(&config).with_dry_run(self.dry_run),
        );

        let report = flow.run().await?;

        if let Some(verdict) = report.verdict {
            println!();
            println!("Result: {}", verdict);
        }
        if let Some(ref created) = report.state.created_pull_request {
            println!("Pull request: {}", created.url);
        }
        if let Some(ref reason) = report.state.pull_request_error {
            println!("No pull request opened: {}", reason);
        }
        if let Some(ref dir) = report.state.repo_dir {
            println!("Working copy: {}", dir.display());
        }

        Ok(())
    }
}

/// Repository slug and pull request number from the command line
///
/// Accepts a pull request URL (`.../owner/repo/pull/5`) in place of `--pr`.
fn parse_target(repo: &str, pr: Option<u64>) -> anyhow::Result<(String, u64)> {
    let url = RepoUrl::parse(repo)?;

    let from_url = repo
        .trim_end_matches('/')
        .rsplit_once("/pull/")
        .and_then(|(_, n)| n.split('/').next())
        .and_then(|n| n.parse::<u64>().ok());

    match pr.or(from_url) {
        Some(0) => bail!("Pull request number must be positive"),
        Some(n) => Ok((url.slug(), n)),
        None => bail!("No pull request given. Use --pr <N> or pass a pull request URL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: RunCommand,
    }

    #[test]
    fn test_banner_style() {
        use crossterm::style::{Attribute, Color};

        let banner = styled_banner();
        assert_eq!(*banner.content(), BANNER);
        assert_eq!(banner.style().foreground_color, Some(Color::Yellow));
        assert!(banner.style().attributes.has(Attribute::Bold));
        assert!(BANNER.contains("OCTOPUS AI"));
        assert!(BANNER.contains("The intelligent tentacles of AI"));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("octo/calc", Some(5)).unwrap(),
            ("octo/calc".to_string(), 5)
        );
        assert_eq!(
            parse_target("https://github.com/octo/calc/pull/12", None).unwrap(),
            ("octo/calc".to_string(), 12)
        );
        assert_eq!(
            parse_target("https://github.com/octo/calc/pull/12/files", Some(3)).unwrap(),
            ("octo/calc".to_string(), 3)
        );
        assert!(parse_target("octo/calc", None).is_err());
        assert!(parse_target("octo/calc", Some(0)).is_err());
        assert!(parse_target("calc", Some(1)).is_err());
    }

    #[test]
    fn test_bug_args() {
        let cli = TestCli::parse_from([
            "octopus",
            "bug",
            "octo/calc",
            "--pr",
            "7",
            "-r",
            "REQ-9",
            "--target-branch",
            "develop",
            "--process",
            "hierarchical",
            "--no-evaluate",
        ]);
        let RunCommand::Bug(args) = cli.command;
        assert_eq!(args.pr, Some(7));
        assert_eq!(args.requirement.as_deref(), Some("REQ-9"));
        assert!(!args.dry_run);

        let config = args.effective_config(&Config::default());
        assert_eq!(config.flow.target_branch, "develop");
        assert_eq!(config.flow.base_branch, "main");
        assert_eq!(config.agent.process, ProcessKind::Hierarchical);
        assert!(!config.flow.evaluate);
    }
}
