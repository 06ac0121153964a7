//! Octopus Core - pull request bug detection and repair
//!
//! Clones a repository, diffs a pull request, and hands the diff to a crew
//! of role-playing LLM agents that review it, fix what they find, and
//! summarize the fix for a follow-up pull request.

pub mod agent;
pub mod config;
pub mod contract;
pub mod crew;
pub mod error;
pub mod evaluation;
pub mod flow;
pub mod git;
pub mod secrets;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use flow::{BugDetectionFlow, FlowOptions, FlowReport, FlowState};
pub use secrets::Secrets;
