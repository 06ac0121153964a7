//! Generic phase state machine
//!
//! Phases move only along registered edges; every accepted move is logged
//! and kept in the history.

use crate::{Error, Result};
use std::fmt::Debug;

/// Whether the current phase is ready to hand over to the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseValidation {
    Valid,
    /// Cannot proceed at all
    Invalid { reason: String },
    /// Something must be filled in first
    NeedsWork { feedback: String },
}

impl PhaseValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, PhaseValidation::Valid)
    }

    pub fn needs_work(&self) -> bool {
        matches!(self, PhaseValidation::NeedsWork { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, PhaseValidation::Invalid { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PhaseValidation::Valid => None,
            PhaseValidation::Invalid { reason } => Some(reason),
            PhaseValidation::NeedsWork { feedback } => Some(feedback),
        }
    }

    /// Turn anything but `Valid` into a flow error
    pub fn into_result(self) -> Result<()> {
        match self.message() {
            None => Ok(()),
            Some(message) => Err(Error::Flow(message.to_string())),
        }
    }
}

/// A workflow driven through explicit phases
pub trait Workflow {
    type Phase: Clone + PartialEq + Debug;

    fn current_phase(&self) -> &Self::Phase;

    fn can_transition_to(&self, phase: &Self::Phase) -> bool;

    /// Move to `phase`, failing when the edge is not registered
    fn transition_to(&mut self, phase: Self::Phase) -> Result<()>;

    /// Check that the current phase left the workflow consistent
    fn validate_phase(&self) -> Result<PhaseValidation>;
}

#[derive(Debug, Clone)]
pub struct StateMachine<P: Clone + PartialEq + Debug> {
    current_phase: P,
    valid_transitions: Vec<(P, P)>,
    history: Vec<(P, P)>,
}

impl<P: Clone + PartialEq + Debug> StateMachine<P> {
    pub fn new(initial_phase: P) -> Self {
        Self {
            current_phase: initial_phase,
            valid_transitions: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn add_transition(mut self, from: P, to: P) -> Self {
        self.valid_transitions.push((from, to));
        self
    }

    pub fn add_transitions(mut self, transitions: impl IntoIterator<Item = (P, P)>) -> Self {
        self.valid_transitions.extend(transitions);
        self
    }

    /// Transitions taken so far, oldest first
    pub fn history(&self) -> &[(P, P)] {
        &self.history
    }

    fn is_valid_transition(&self, from: &P, to: &P) -> bool {
        self.valid_transitions
            .iter()
            .any(|(f, t)| f == from && t == to)
    }
}

impl<P: Clone + PartialEq + Debug> Workflow for StateMachine<P> {
    type Phase = P;

    fn current_phase(&self) -> &Self::Phase {
        &self.current_phase
    }

    fn can_transition_to(&self, phase: &Self::Phase) -> bool {
        self.is_valid_transition(&self.current_phase, phase)
    }

    fn transition_to(&mut self, phase: Self::Phase) -> Result<()> {
        if !self.can_transition_to(&phase) {
            return Err(Error::Flow(format!(
                "Invalid transition from {:?} to {:?}",
                self.current_phase, phase
            )));
        }

        tracing::info!(
            from = ?self.current_phase,
            to = ?phase,
            "Flow phase transition"
        );

        let from = std::mem::replace(&mut self.current_phase, phase.clone());
        self.history.push((from, phase));
        Ok(())
    }

    fn validate_phase(&self) -> Result<PhaseValidation> {
        Ok(PhaseValidation::Valid)
    }
}
