//! Bug detection flow
//!
//! A phase state machine over a shared [`FlowState`]. Each phase fills in
//! part of the state and is validated before the next one starts; detection
//! routes to either opening a follow-up pull request or ending without one.

mod machine;
mod phase;
mod runner;
mod services;
mod state;

pub use machine::{PhaseValidation, StateMachine, Workflow};
pub use phase::{BugVerdict, FlowPhase};
pub use runner::{statistics_block, BugDetectionFlow, FlowOptions, FlowReport};
pub use services::{
    CreatedPullRequest, GitWorkspace, PullRequestDetails, PullRequestService, RepoWorkspace,
};
pub use state::FlowState;
