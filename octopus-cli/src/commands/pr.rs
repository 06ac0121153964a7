//! Pull request inspection commands

use clap::{Args, Subcommand};
use octopus_github::GitHubClient;

#[derive(Args, Debug)]
pub struct PrArgs {
    #[command(subcommand)]
    pub command: PrCommand,
}

#[derive(Subcommand, Debug)]
pub enum PrCommand {
    /// List open pull requests
    List {
        /// Repository (owner/repo or URL)
        repo: String,
    },

    /// List the files a pull request changes
    Files {
        /// Repository (owner/repo or URL)
        repo: String,
        /// Pull request number
        number: u64,
    },

    /// Show title, body, comments and commits of a pull request
    Show {
        /// Repository (owner/repo or URL)
        repo: String,
        /// Pull request number
        number: u64,
    },
}

impl PrArgs {
    pub async fn execute(&self, verbose: bool) -> anyhow::Result<()> {
        match &self.command {
            PrCommand::List { repo } => list_open(repo, verbose).await,
            PrCommand::Files { repo, number } => list_files(repo, *number).await,
            PrCommand::Show { repo, number } => show(repo, *number).await,
        }
    }
}

async fn list_open(repo: &str, verbose: bool) -> anyhow::Result<()> {
    let client = GitHubClient::from_url(repo)?;
    let prs = client.list_open_pull_requests().await?;

    if prs.is_empty() {
        println!("No open pull requests in {}", client.slug());
        return Ok(());
    }

    println!("Found {} open pull request(s):", prs.len());
    println!();
    for pr in prs {
        println!(
            "#{:<5} {} ({} -> {})",
            pr.number, pr.title, pr.head_branch, pr.base_branch
        );
        if verbose {
            if let Some(author) = pr.author {
                println!("       by {}", author);
            }
            if let Some(url) = pr.url {
                println!("       {}", url);
            }
        }
    }
    Ok(())
}

async fn list_files(repo: &str, number: u64) -> anyhow::Result<()> {
    let client = GitHubClient::from_url(repo)?;
    let files = client.list_pull_request_files(number).await?;

    println!("Pull request #{} changes {} file(s):", number, files.len());
    for file in files {
        println!(
            "  {:<9} {} (+{} -{})",
            file.status, file.filename, file.additions, file.deletions
        );
    }
    Ok(())
}

async fn show(repo: &str, number: u64) -> anyhow::Result<()> {
    let client = GitHubClient::from_url(repo)?;
    let details = client.get_pull_request_details(number).await?;

    println!("#{} {}", details.number, details.title);
    println!("State: {}", details.state);
    println!("Branches: {} -> {}", details.head_branch, details.base_branch);
    println!();
    if let Some(ref body) = details.body {
        if !body.trim().is_empty() {
            println!("{}", body.trim());
            println!();
        }
    }

    println!("Commits ({}):", details.commits.len());
    for message in &details.commits {
        println!("  - {}", message.lines().next().unwrap_or_default());
    }

    println!("Comments ({}):", details.comments.len());
    for comment in &details.comments {
        println!("  - {}", comment);
    }
    Ok(())
}
