use thiserror::Error;

use crate::net::ids::StateId;
use crate::net::rate::RateError;

/// Fatal exploration failures. Any of them aborts the whole run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExplorationError {
    #[error("transition `{transition}` is not enabled{}", at(.state))]
    InvalidFiring {
        transition: String,
        state: Option<StateId>,
    },
    #[error(
        "state space exceeds {limit} states: net too large, reduce scope or switch to coverability"
    )]
    ExplorationBoundExceeded { limit: usize },
    #[error(
        "timeless trap{} after {iterations} step(s): net has no stationary distribution",
        at(.state)
    )]
    TimelessTrap {
        state: Option<StateId>,
        iterations: usize,
    },
    #[error("rate of transition `{transition}`{}: {reason}", at(.state))]
    Rate {
        transition: String,
        reason: RateError,
        state: Option<StateId>,
    },
    #[error("coverability needs unlimited capacities but place `{place}` has a capacity")]
    CapacityRestricted { place: String },
    #[error("cannot start exploration workers: {0}")]
    WorkerPool(String),
    #[error("exploration produced an inconsistent state space: {0}")]
    Inconsistent(String),
}

fn at(state: &Option<StateId>) -> String {
    state.map(|id| format!(" in state {id}")).unwrap_or_default()
}

impl ExplorationError {
    /// Attaches the state being expanded, keeping an id already present.
    pub fn with_state(mut self, id: StateId) -> Self {
        match &mut self {
            ExplorationError::InvalidFiring { state, .. }
            | ExplorationError::TimelessTrap { state, .. }
            | ExplorationError::Rate { state, .. } => {
                state.get_or_insert(id);
            }
            ExplorationError::ExplorationBoundExceeded { .. }
            | ExplorationError::CapacityRestricted { .. }
            | ExplorationError::WorkerPool(_)
            | ExplorationError::Inconsistent(_) => {}
        }
        self
    }

    pub fn is_timeless_trap(&self) -> bool {
        matches!(self, ExplorationError::TimelessTrap { .. })
    }

    pub fn state(&self) -> Option<StateId> {
        match self {
            ExplorationError::InvalidFiring { state, .. }
            | ExplorationError::TimelessTrap { state, .. }
            | ExplorationError::Rate { state, .. } => *state,
            _ => None,
        }
    }
}
