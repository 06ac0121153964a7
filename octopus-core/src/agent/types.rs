//! Agent roles making up the bug-fixing team
//!
//! - Manager: coordinates the team in hierarchical runs
//! - Planner: drafts a step-by-step plan before the manager starts
//! - Reviewer: reads the diff and hypothesizes bugs
//! - Developer: fixes confirmed bugs
//! - Qa: verifies hypotheses and fixes with tests
//! - GitSpecialist: writes the commit message and PR description

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role an agent plays in the crew
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Manager,
    Planner,
    Reviewer,
    Developer,
    Qa,
    GitSpecialist,
}

impl AgentRole {
    /// Get all roles
    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::Manager,
            AgentRole::Planner,
            AgentRole::Reviewer,
            AgentRole::Developer,
            AgentRole::Qa,
            AgentRole::GitSpecialist,
        ]
    }

    /// Roles the manager can delegate to
    pub fn specialists() -> &'static [AgentRole] {
        &[
            AgentRole::Reviewer,
            AgentRole::Developer,
            AgentRole::Qa,
            AgentRole::GitSpecialist,
        ]
    }

    /// Short machine name
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Manager => "manager",
            AgentRole::Planner => "planner",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Developer => "developer",
            AgentRole::Qa => "qa",
            AgentRole::GitSpecialist => "git_specialist",
        }
    }

    /// Job title the agent is addressed by
    pub fn title(&self) -> &'static str {
        match self {
            AgentRole::Manager => "Engineering Team Lead",
            AgentRole::Planner => "Planning Agent",
            AgentRole::Reviewer => "Senior Code Reviewer",
            AgentRole::Developer => "Senior Python Developer",
            AgentRole::Qa => "Senior QA Engineer",
            AgentRole::GitSpecialist => "Git Specialist",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            AgentRole::Manager => {
                "Coordinate the bug detection and fixing process by managing the team of \
                 specialists. Ensure proper workflow execution and quality standards."
            }
            AgentRole::Planner => {
                "Produce a concise, ordered plan for reviewing, fixing, verifying and \
                 committing the changes of a pull request."
            }
            AgentRole::Reviewer => {
                "Review pull requests to detect bugs. Act as the last line of defense \
                 against bugs. Code style, naming, documentation and missing tests are not \
                 your concern; focus only on the core logic of the functionality."
            }
            AgentRole::Developer => "Fix bugs reported in the code review for the codebase.",
            AgentRole::Qa => {
                "Ensure the quality of the codebase by writing and executing tests. \
                 Identify and report bugs found during testing."
            }
            AgentRole::GitSpecialist => {
                "Generate commit messages and pull request descriptions based on code changes."
            }
        }
    }

    pub fn backstory(&self) -> &'static str {
        match self {
            AgentRole::Manager => {
                "You are an experienced engineering team lead with 15+ years of experience \
                 managing development teams and ensuring code quality. You understand the full \
                 software development lifecycle and can coordinate between code reviewers, \
                 developers, QA engineers and Git specialists."
            }
            AgentRole::Planner => {
                "You are a pragmatic technical planner who breaks engineering work into small, \
                 verifiable steps."
            }
            AgentRole::Reviewer => {
                "You are a senior code reviewer with more than 10 years of experience in \
                 identifying bugs. Your specialty is white-box testing, and you are proficient \
                 in Python."
            }
            AgentRole::Developer => {
                "You are a senior Python developer with more than 10 years of experience in \
                 Python development."
            }
            AgentRole::Qa => {
                "You are a QA engineer with more than 5 years of experience in software \
                 testing. Your specialty is automated testing, and you are proficient in Python."
            }
            AgentRole::GitSpecialist => {
                "You are a Git specialist with extensive experience in managing Git repositories."
            }
        }
    }

    /// Whether the role may change files in the repository
    pub fn can_write_files(&self) -> bool {
        matches!(self, AgentRole::Developer | AgentRole::Manager)
    }

    /// Whether the role can hand work to other roles
    pub fn can_delegate(&self) -> bool {
        matches!(self, AgentRole::Manager)
    }

    /// Built-in model for the role, if it differs from the global model
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            AgentRole::Manager => Some("o3-mini"),
            _ => None,
        }
    }

    /// Built-in sampling temperature for the role
    pub fn default_temperature(&self) -> Option<f32> {
        match self {
            AgentRole::Reviewer | AgentRole::Developer | AgentRole::Qa => Some(0.1),
            _ => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "manager" | "lead" => Ok(AgentRole::Manager),
            "planner" | "planning" => Ok(AgentRole::Planner),
            "reviewer" | "review" => Ok(AgentRole::Reviewer),
            "developer" | "dev" => Ok(AgentRole::Developer),
            "qa" | "tester" => Ok(AgentRole::Qa),
            "git_specialist" | "git" => Ok(AgentRole::GitSpecialist),
            _ => Err(format!("Unknown agent role: {}", s)),
        }
    }
}
