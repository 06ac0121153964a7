//! Claude Code backend implementation

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{AgentOutput, AgentRequest, Backend, TokenUsage};
use crate::agent::output::{CollectHandler, OutputStreamer};
use crate::{Error, Result};

/// Model names the `claude` CLI accepts
const CLAUDE_MODEL_ALIASES: &[&str] = &["opus", "sonnet", "haiku"];

/// Claude Code backend implementation
#[derive(Debug, Clone)]
pub struct ClaudeBackend {
    pub claude_path: String,
    /// Fixed model; otherwise the request model is used when Claude accepts it
    pub model: Option<String>,
    pub verbose: bool,
}

impl ClaudeBackend {
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
            verbose: false,
        }
    }

    /// Create a Claude backend with custom path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.claude_path = path.into();
        self
    }

    /// Create a Claude backend with a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The model flag to pass, if any
    ///
    /// Role models configured for other providers (e.g. `gpt-4o`) are dropped.
    fn model_for(&self, request: &AgentRequest) -> Option<String> {
        if let Some(ref model) = self.model {
            return Some(model.clone());
        }

        let requested = request.model.as_str();
        if requested.starts_with("claude-") || CLAUDE_MODEL_ALIASES.contains(&requested) {
            Some(requested.to_string())
        } else {
            None
        }
    }

    fn build_command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--dangerously-skip-permissions");

        if !request.system.is_empty() {
            cmd.arg("--append-system-prompt").arg(&request.system);
        }

        if let Some(model) = self.model_for(request) {
            cmd.arg("--model").arg(model);
        }

        cmd.current_dir(&request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput> {
        if !request.workdir.exists() {
            return Err(Error::Agent(format!(
                "Working directory does not exist: {}",
                request.workdir.display()
            )));
        }

        let started = Instant::now();
        let mut child = self.build_command(request).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Agent(format!(
                    "Claude executable not found at '{}'. Is Claude Code installed?",
                    self.claude_path
                ))
            } else {
                Error::Io(e)
            }
        })?;

        // The prompt goes over stdin; diffs can exceed argv limits
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Agent("Failed to capture claude stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Agent("Failed to capture claude stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut handler = CollectHandler::new(self.verbose);
        OutputStreamer::new(BufReader::new(stdout))
            .stream(&mut handler)
            .await?;

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Agent(format!(
                "claude exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        let usage = handler
            .cost
            .as_ref()
            .map(|c| {
                let cached = c.cache_read_tokens.unwrap_or(0);
                TokenUsage {
                    total_tokens: c.input_tokens + c.output_tokens,
                    prompt_tokens: c.input_tokens,
                    cached_prompt_tokens: cached,
                    completion_tokens: c.output_tokens,
                    successful_requests: 1,
                }
            })
            .unwrap_or(TokenUsage {
                successful_requests: 1,
                ..TokenUsage::default()
            });

        tracing::debug!(tool_calls = handler.tool_calls, "claude run finished");

        Ok(AgentOutput {
            text: handler.answer().to_string(),
            usage,
            elapsed: started.elapsed(),
        })
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.claude_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRole;
    use std::path::PathBuf;

    fn request(model: &str, workdir: PathBuf) -> AgentRequest {
        AgentRequest {
            role: AgentRole::Developer,
            system: "You are Senior Python Developer.".to_string(),
            prompt: "Fix it".to_string(),
            workdir,
            model: model.to_string(),
            temperature: Some(0.1),
            top_p: None,
        }
    }

    #[test]
    fn test_claude_backend_builder() {
        let backend = ClaudeBackend::new()
            .with_path("/custom/claude")
            .with_model("opus");

        assert_eq!(backend.claude_path, "/custom/claude");
        assert_eq!(backend.model, Some("opus".to_string()));
        assert_eq!(backend.name(), "claude");
    }

    #[test]
    fn test_model_selection() {
        let backend = ClaudeBackend::new();
        let dir = std::env::temp_dir();

        assert_eq!(backend.model_for(&request("gpt-4o", dir.clone())), None);
        assert_eq!(
            backend.model_for(&request("sonnet", dir.clone())),
            Some("sonnet".to_string())
        );
        assert_eq!(
            backend.model_for(&request("claude-sonnet-4-5", dir.clone())),
            Some("claude-sonnet-4-5".to_string())
        );

        let fixed = ClaudeBackend::new().with_model("haiku");
        assert_eq!(fixed.model_for(&request("gpt-4o", dir)), Some("haiku".to_string()));
    }

    #[tokio::test]
    async fn test_run_invalid_workdir() {
        let backend = ClaudeBackend::new();
        let result = backend
            .run(&request("gpt-4o", PathBuf::from("/nonexistent/path/12345")))
            .await;
        assert!(matches!(result, Err(Error::Agent(_))));
    }

    #[tokio::test]
    async fn test_run_missing_executable() {
        let backend = ClaudeBackend::new().with_path("/usr/bin/nonexistent-claude-binary");
        let result = backend.run(&request("gpt-4o", std::env::temp_dir())).await;
        assert!(result.is_err());
        assert!(!backend.is_available());
    }
}
