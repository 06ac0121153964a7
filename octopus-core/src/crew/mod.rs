//! Crews: role-tagged agents executing tasks
//!
//! A sequential crew runs a fixed pipeline (review, verify, fix, re-verify,
//! summarize) where gated tasks are skipped once no bug survives QA. A
//! hierarchical crew runs a planning pass, then hands a single task to the
//! manager, who answers for the whole team.

mod output;
mod process;
mod task;

pub use output::{CrewOutput, TaskOutput};
pub use process::{Crew, CrewInputs};
pub use task::{GateState, Stage, Task, TaskGate};
