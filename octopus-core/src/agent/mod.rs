//! Agent roles, prompts and the LLM backends they run on

mod backends;
mod output;
mod prompts;
pub mod tools;
mod types;

pub use backends::{
    AgentOutput, AgentRequest, Backend, BackendRegistry, ClaudeBackend, OpenAiBackend, TokenUsage,
};
pub use output::{CollectHandler, CostInfo, OutputStreamer, StreamHandler, StreamMessage};
pub use prompts::{get_template, render, render_system, PromptBuilder, PromptContext};
pub use types::AgentRole;
