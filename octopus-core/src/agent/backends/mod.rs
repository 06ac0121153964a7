//! LLM backends agents run on

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::AgentRole;
use crate::config::{BackendKind, Config};
use crate::Result;

mod claude;
mod openai;

pub use claude::ClaudeBackend;
pub use openai::OpenAiBackend;

/// Token accounting for one or more LLM requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub completion_tokens: u64,
    pub successful_requests: u64,
}

impl TokenUsage {
    /// Fold another usage record into this one
    pub fn add(&mut self, other: &TokenUsage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.cached_prompt_tokens += other.cached_prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.successful_requests += other.successful_requests;
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.add(&rhs);
    }
}

/// A single prompt sent to a backend on behalf of a role
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    /// System prompt (role identity)
    pub system: String,
    /// Task prompt
    pub prompt: String,
    /// Repository the agent works in
    pub workdir: PathBuf,
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// What a backend answered
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub text: String,
    pub usage: TokenUsage,
    pub elapsed: Duration,
}

/// Trait for LLM backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &'static str;

    /// Run one request to completion
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput>;

    /// Check if this backend can be used on this system
    fn is_available(&self) -> bool;
}

/// Registry of configured backends
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration
    ///
    /// The Claude backend is always registered. The OpenAI-compatible backend
    /// needs an API key.
    pub fn from_config(config: &Config, api_key: Option<String>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(ClaudeBackend::new().with_path(&config.agent.claude_path)));

        if let Some(key) = api_key {
            registry.register(Arc::new(OpenAiBackend::new(&config.llm, key)?));
        }

        Ok(registry)
    }

    /// Register a backend
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Get a backend by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// Get a backend by kind
    pub fn get_by_kind(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        self.get(kind.name())
    }

    /// List all registered backends (whether available or not)
    pub fn list_registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
