//! Phases of the bug detection flow

use serde::{Deserialize, Serialize};

use super::machine::StateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    Initialize,
    FetchPrDetails,
    CloneRepository,
    FetchDiff,
    CheckoutBranch,
    DetectBugs,
    CreatePullRequest,
    Evaluate,
    EndWithoutPr,
    Complete,
    Failed,
}

impl FlowPhase {
    /// Phases in the order they can occur
    pub fn all() -> &'static [FlowPhase] {
        &[
            FlowPhase::Initialize,
            FlowPhase::FetchPrDetails,
            FlowPhase::CloneRepository,
            FlowPhase::FetchDiff,
            FlowPhase::CheckoutBranch,
            FlowPhase::DetectBugs,
            FlowPhase::CreatePullRequest,
            FlowPhase::Evaluate,
            FlowPhase::EndWithoutPr,
            FlowPhase::Complete,
            FlowPhase::Failed,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowPhase::Complete | FlowPhase::Failed)
    }

    pub fn description(&self) -> &'static str {
        match self {
            FlowPhase::Initialize => "Initializing",
            FlowPhase::FetchPrDetails => "Fetching pull request details",
            FlowPhase::CloneRepository => "Cloning repository",
            FlowPhase::FetchDiff => "Fetching pull request diff",
            FlowPhase::CheckoutBranch => "Checking out fix branch",
            FlowPhase::DetectBugs => "Detecting bugs",
            FlowPhase::CreatePullRequest => "Creating pull request",
            FlowPhase::Evaluate => "Evaluating fixes",
            FlowPhase::EndWithoutPr => "Ending without pull request",
            FlowPhase::Complete => "Complete",
            FlowPhase::Failed => "Failed",
        }
    }

    /// Every legal edge of the flow graph
    pub fn transitions() -> Vec<(FlowPhase, FlowPhase)> {
        use FlowPhase::*;

        let mut edges = vec![
            (Initialize, FetchPrDetails),
            (FetchPrDetails, CloneRepository),
            (CloneRepository, FetchDiff),
            (FetchDiff, CheckoutBranch),
            (CheckoutBranch, DetectBugs),
            (DetectBugs, CreatePullRequest),
            (DetectBugs, EndWithoutPr),
            (CreatePullRequest, Evaluate),
            (Evaluate, Complete),
            (EndWithoutPr, Complete),
            // Dry runs stop once the branch is ready
            (CheckoutBranch, Complete),
        ];
        edges.extend(
            Self::all()
                .iter()
                .filter(|p| !p.is_terminal())
                .map(|p| (*p, Failed)),
        );
        edges
    }

    /// A state machine over the flow graph, starting at `Initialize`
    pub fn state_machine() -> StateMachine<FlowPhase> {
        StateMachine::new(FlowPhase::Initialize).add_transitions(Self::transitions())
    }
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Outcome of bug detection, deciding the branch the flow takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugVerdict {
    BugsFound,
    NoBugsFound,
}

impl BugVerdict {
    pub fn from_bugs_found(bugs_found: bool) -> Self {
        if bugs_found {
            BugVerdict::BugsFound
        } else {
            BugVerdict::NoBugsFound
        }
    }

    /// Phase the flow moves to after detection
    pub fn next_phase(&self) -> FlowPhase {
        match self {
            BugVerdict::BugsFound => FlowPhase::CreatePullRequest,
            BugVerdict::NoBugsFound => FlowPhase::EndWithoutPr,
        }
    }
}

impl std::fmt::Display for BugVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BugVerdict::BugsFound => write!(f, "Bugs found"),
            BugVerdict::NoBugsFound => write!(f, "No bugs found"),
        }
    }
}
