//! Configuration management for Octopus
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (OCTOPUS_*)
//! 3. Config file (~/.config/octopus/config.toml)
//! 4. Default values

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRole;
use crate::{Error, Result};

/// Which LLM backend drives the agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum BackendKind {
    /// Any OpenAI-compatible chat completions endpoint
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Claude Code CLI running inside the cloned repository
    #[serde(rename = "claude")]
    Claude,
}

impl BackendKind {
    /// Registry name of the backend
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Claude => "claude",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" => Ok(BackendKind::OpenAi),
            "claude" => Ok(BackendKind::Claude),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// How the crew executes its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Reviewer, QA, developer and git specialist run one after another
    #[default]
    Sequential,
    /// A manager agent leads a single task on behalf of the team
    Hierarchical,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Sequential => write!(f, "sequential"),
            ProcessKind::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

impl FromStr for ProcessKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(ProcessKind::Sequential),
            "hierarchical" | "hier" => Ok(ProcessKind::Hierarchical),
            _ => Err(format!("Unknown process: {}", s)),
        }
    }
}

/// Agent-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Backend used for every agent call
    pub backend: BackendKind,

    /// Path to the claude executable (claude backend only)
    pub claude_path: String,

    /// How many times an agent call is retried on failure or malformed output
    pub max_retries: u32,

    /// Crew execution process
    pub process: ProcessKind,

    /// Execute the code snippets QA asks for and report their real outcome
    pub run_snippets: bool,

    /// Timeout for each QA snippet
    #[serde(with = "humantime_serde")]
    pub snippet_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi,
            claude_path: "claude".to_string(),
            max_retries: 4,
            process: ProcessKind::Sequential,
            run_snippets: true,
            snippet_timeout: Duration::from_secs(30),
        }
    }
}

/// Settings for the OpenAI-compatible provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the chat completions API
    pub api_base: String,

    /// Default model for roles without a specific model
    pub model: String,

    /// Default sampling temperature (provider default when unset)
    pub temperature: Option<f32>,

    /// Default nucleus sampling value (provider default when unset)
    pub top_p: Option<f32>,

    /// Timeout for a single completion request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: None,
            top_p: None,
            request_timeout: Duration::from_secs(600),
        }
    }
}

/// Per-role model overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleSettings {
    /// Model override
    pub model: Option<String>,
    /// Temperature override
    pub temperature: Option<f32>,
}

/// Overrides for every agent role
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RolesConfig {
    pub manager: RoleSettings,
    pub planner: RoleSettings,
    pub reviewer: RoleSettings,
    pub developer: RoleSettings,
    pub qa: RoleSettings,
    pub git_specialist: RoleSettings,
}

impl RolesConfig {
    /// Get the overrides for a role
    pub fn get(&self, role: AgentRole) -> &RoleSettings {
        match role {
            AgentRole::Manager => &self.manager,
            AgentRole::Planner => &self.planner,
            AgentRole::Reviewer => &self.reviewer,
            AgentRole::Developer => &self.developer,
            AgentRole::Qa => &self.qa,
            AgentRole::GitSpecialist => &self.git_specialist,
        }
    }
}

/// Model settings after applying role defaults and overrides
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// Bug detection flow settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Parent directory for repository clones (defaults to the cache dir)
    pub workspace_dir: Option<PathBuf>,

    /// Branch the pull request diff is computed against
    pub base_branch: String,

    /// Branch the follow-up pull request targets
    pub target_branch: String,

    /// Use a three-dot diff (changes since the merge base)
    pub incremental_diff: bool,

    /// Directories hidden from agents when listing the repository
    pub ignored_dirs: Vec<String>,

    /// Run the fixed files' tests after opening the pull request
    pub evaluate: bool,

    /// Timeout for each evaluation test run
    #[serde(with = "humantime_serde")]
    pub test_timeout: Duration,

    /// Directory (sibling of the source directory) holding evaluation tests
    pub test_dir: String,

    /// Where to write the crew output log, if anywhere
    pub output_log: Option<PathBuf>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            base_branch: "main".to_string(),
            target_branch: "test".to_string(),
            incremental_diff: true,
            ignored_dirs: vec![
                ".git".to_string(),
                "__pycache__".to_string(),
                "json_testcases".to_string(),
                "python_testcases".to_string(),
            ],
            evaluate: true,
            test_timeout: Duration::from_secs(60),
            test_dir: "python_testcases".to_string(),
            output_log: None,
        }
    }
}

impl FlowConfig {
    /// Resolve the directory clones are placed in
    ///
    /// Returns `~/.cache/octopus/workspaces` unless configured
    pub fn workspace_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.workspace_dir {
            return Ok(dir.clone());
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))?;

        Ok(cache_dir.join("octopus").join("workspaces"))
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<BackendKind>,
    pub model: Option<String>,
    pub claude_path: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Agent configuration
    pub agent: AgentConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Per-role overrides
    pub roles: RolesConfig,

    /// Flow configuration
    pub flow: FlowConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/octopus/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("octopus").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - OCTOPUS_BACKEND: openai or claude
    /// - OCTOPUS_MODEL: Default model
    /// - OCTOPUS_CLAUDE_PATH: Path to claude executable
    /// - OCTOPUS_API_BASE: Chat completions base URL
    /// - OCTOPUS_TARGET_BRANCH: Follow-up pull request destination
    /// - OCTOPUS_WORKSPACE_DIR: Parent directory for clones
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = lookup("OCTOPUS_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.agent.backend = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring OCTOPUS_BACKEND"),
            }
        }

        if let Some(model) = lookup("OCTOPUS_MODEL") {
            self.llm.model = model;
        }

        if let Some(claude_path) = lookup("OCTOPUS_CLAUDE_PATH") {
            self.agent.claude_path = claude_path;
        }

        if let Some(api_base) = lookup("OCTOPUS_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Some(branch) = lookup("OCTOPUS_TARGET_BRANCH") {
            self.flow.target_branch = branch;
        }

        if let Some(dir) = lookup("OCTOPUS_WORKSPACE_DIR") {
            self.flow.workspace_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.agent.backend = backend;
        }

        if let Some(model) = overrides.model {
            self.llm.model = model;
        }

        if let Some(path) = overrides.claude_path {
            self.agent.claude_path = path;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self> {
        Ok(Self::load()?.with_env_overrides().with_cli_overrides(overrides))
    }

    /// Model settings for a role: override > role default > provider default
    ///
    /// Reasoning models only get a temperature set explicitly for the role;
    /// global sampling settings are not passed to them.
    pub fn settings_for(&self, role: AgentRole) -> ResolvedSettings {
        let overrides = self.roles.get(role);

        let model = overrides
            .model
            .clone()
            .or_else(|| role.default_model().map(str::to_string))
            .unwrap_or_else(|| self.llm.model.clone());

        if is_reasoning_model(&model) {
            return ResolvedSettings {
                model,
                temperature: overrides.temperature,
                top_p: None,
            };
        }

        let temperature = overrides
            .temperature
            .or_else(|| role.default_temperature())
            .or(self.llm.temperature);

        ResolvedSettings {
            model,
            temperature,
            top_p: self.llm.top_p,
        }
    }
}

/// OpenAI o-series models (`o1`, `o3-mini`, `openai/o4-mini`, ...), which
/// reject sampling parameters
pub fn is_reasoning_model(model: &str) -> bool {
    let name = model.rsplit('/').next().unwrap_or(model);
    let mut chars = name.chars();
    matches!(chars.next(), Some('o')) && chars.next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.backend, BackendKind::OpenAi);
        assert_eq!(config.agent.claude_path, "claude");
        assert_eq!(config.agent.max_retries, 4);
        assert!(config.agent.run_snippets);
        assert_eq!(config.agent.snippet_timeout, Duration::from_secs(30));
        assert_eq!(config.flow.target_branch, "test");
        assert_eq!(config.flow.base_branch, "main");
        assert_eq!(config.flow.test_timeout, Duration::from_secs(60));
        assert!(config.flow.ignored_dirs.contains(&"__pycache__".to_string()));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(ConfigOverrides {
            backend: Some(BackendKind::Claude),
            model: Some("gpt-4.1".to_string()),
            claude_path: Some("/custom/claude".to_string()),
        });

        assert_eq!(config.agent.backend, BackendKind::Claude);
        assert_eq!(config.agent.claude_path, "/custom/claude");
        assert_eq!(config.llm.model, "gpt-4.1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OCTOPUS_BACKEND", "claude"),
            ("OCTOPUS_TARGET_BRANCH", "develop"),
            ("OCTOPUS_WORKSPACE_DIR", "/tmp/octopus"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.agent.backend, BackendKind::Claude);
        assert_eq!(config.flow.target_branch, "develop");
        assert_eq!(
            config.flow.workspace_dir().unwrap(),
            PathBuf::from("/tmp/octopus")
        );
    }

    #[test]
    fn test_invalid_backend_env_is_ignored() {
        let config = Config::default().with_overrides_from(|k| {
            (k == "OCTOPUS_BACKEND").then(|| "bogus".to_string())
        });
        assert_eq!(config.agent.backend, BackendKind::OpenAi);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[agent]
backend = "claude"
claude_path = "/usr/local/bin/claude"
process = "hierarchical"

[llm]
model = "gpt-4.1"
request_timeout = "2m"

[roles.reviewer]
model = "o3"

[flow]
target_branch = "develop"
test_timeout = "90s"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.backend, BackendKind::Claude);
        assert_eq!(config.agent.claude_path, "/usr/local/bin/claude");
        assert_eq!(config.agent.process, ProcessKind::Hierarchical);
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.request_timeout, Duration::from_secs(120));
        assert_eq!(config.roles.reviewer.model, Some("o3".to_string()));
        assert_eq!(config.flow.target_branch, "develop");
        assert_eq!(config.flow.test_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[llm]
model = "gpt-4o-mini"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.claude_path, "claude");
        assert_eq!(config.llm.api_base, "https://api.openai.com/v1");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_role_settings_resolution() {
        let mut config = Config::default();

        let manager = config.settings_for(AgentRole::Manager);
        assert_eq!(manager.model, "o3-mini");
        assert_eq!(manager.temperature, None);

        let reviewer = config.settings_for(AgentRole::Reviewer);
        assert_eq!(reviewer.model, "gpt-4o");
        assert_eq!(reviewer.temperature, Some(0.1));

        config.roles.reviewer.temperature = Some(0.0);
        config.llm.model = "gpt-4.1".to_string();
        let reviewer = config.settings_for(AgentRole::Reviewer);
        assert_eq!(reviewer.model, "gpt-4.1");
        assert_eq!(reviewer.temperature, Some(0.0));
    }

    #[test]
    fn test_reasoning_models_skip_global_sampling() {
        let mut config = Config::default();
        config.llm.temperature = Some(0.7);
        config.llm.top_p = Some(0.9);

        let manager = config.settings_for(AgentRole::Manager);
        assert_eq!(manager.model, "o3-mini");
        assert_eq!(manager.temperature, None);
        assert_eq!(manager.top_p, None);

        let git = config.settings_for(AgentRole::GitSpecialist);
        assert_eq!(git.temperature, Some(0.7));
        assert_eq!(git.top_p, Some(0.9));

        config.roles.qa.model = Some("openai/o4-mini".to_string());
        let qa = config.settings_for(AgentRole::Qa);
        assert_eq!(qa.temperature, None);

        config.roles.manager.temperature = Some(1.0);
        assert_eq!(config.settings_for(AgentRole::Manager).temperature, Some(1.0));
    }

    #[test]
    fn test_is_reasoning_model() {
        assert!(is_reasoning_model("o1"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("openai/o4-mini"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("omni-moderation"));
        assert!(!is_reasoning_model(""));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!("claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert!("gemini".parse::<BackendKind>().is_err());
        assert_eq!("hier".parse::<ProcessKind>().unwrap(), ProcessKind::Hierarchical);
    }
}
