//! Octopus CLI - automated pull request bug detection and repair

mod commands;

use clap::{Parser, Subcommand};
use octopus_core::config::{BackendKind, ConfigOverrides};
use octopus_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{PrArgs, RunArgs, SecretsArgs};

/// Octopus: LLM agents that review pull requests and fix their bugs
#[derive(Parser, Debug)]
#[command(name = "octopus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// LLM backend (openai or claude)
    #[arg(long, global = true, env = "OCTOPUS_BACKEND")]
    backend: Option<BackendKind>,

    /// Default model (overrides config and env)
    #[arg(long, global = true, env = "OCTOPUS_MODEL")]
    model: Option<String>,

    /// Path to claude executable (overrides config and env)
    #[arg(long, global = true, env = "OCTOPUS_CLAUDE_PATH")]
    claude_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run an agent workflow
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Inspect pull requests
    Pr(PrArgs),

    /// Show current configuration
    Config,

    /// Manage the secrets file
    Secrets(SecretsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info,octopus_core=debug,octopus_github=debug,octopus_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_config(config: &Config) {
    println!("Octopus Configuration");
    println!("=====================");
    println!();
    println!("Agent Settings:");
    println!("  backend: {}", config.agent.backend);
    println!("  process: {}", config.agent.process);
    println!("  claude_path: {}", config.agent.claude_path);
    println!("  max_retries: {}", config.agent.max_retries);
    println!("  run_snippets: {}", config.agent.run_snippets);
    println!("  snippet_timeout: {:?}", config.agent.snippet_timeout);
    println!();
    println!("LLM Settings:");
    println!("  api_base: {}", config.llm.api_base);
    println!("  model: {}", config.llm.model);
    for role in octopus_core::agent::AgentRole::all() {
        let settings = config.settings_for(*role);
        println!(
            "  {}: {} (temperature: {})",
            role,
            settings.model,
            settings
                .temperature
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(default)".to_string())
        );
    }
    println!();
    println!("Flow Settings:");
    match config.flow.workspace_dir() {
        Ok(dir) => println!("  workspace_dir: {}", dir.display()),
        Err(e) => println!("  workspace_dir: (unavailable: {})", e),
    }
    println!("  base_branch: {}", config.flow.base_branch);
    println!("  target_branch: {}", config.flow.target_branch);
    println!("  incremental_diff: {}", config.flow.incremental_diff);
    println!("  evaluate: {}", config.flow.evaluate);
    println!("  test_timeout: {:?}", config.flow.test_timeout);
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load_with_overrides(ConfigOverrides {
        backend: cli.backend,
        model: cli.model.clone(),
        claude_path: cli.claude_path.clone(),
    })?;

    if cli.verbose {
        tracing::info!(
            backend = %config.agent.backend,
            model = %config.llm.model,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("octopus {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Pr(args)) => {
            args.execute(cli.verbose).await?;
        }
        Some(Commands::Config) => print_config(&config),
        Some(Commands::Secrets(args)) => {
            args.execute()?;
        }
        None => {
            println!("Octopus - The intelligent tentacles of AI");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
