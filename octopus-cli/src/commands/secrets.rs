//! Secrets file management

use clap::{Args, Subcommand};
use octopus_core::Secrets;

#[derive(Args, Debug)]
pub struct SecretsArgs {
    #[command(subcommand)]
    pub command: SecretsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SecretsCommand {
    /// Write a template secrets file (never overwrites)
    Init,
}

impl SecretsArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self.command {
            SecretsCommand::Init => {
                let path = Secrets::create_template()?;
                println!("Created {}", path.display());
                println!("Add your GitHub token and LLM API key, or set GITHUB_TOKEN / OPENAI_API_KEY.");
                Ok(())
            }
        }
    }
}
