//! Successor generation, rates and the state ceiling of one exploration run.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::explorer::coverability::CoverabilityTree;
use crate::explorer::error::ExplorationError;
use crate::net::ids::{StateId, TransitionId};
use crate::net::rate::{RateError, RateTable};
use crate::net::{FireError, Net};
use crate::state::{ClassifiedState, Marking, StateClassifier};

/// How competing immediate transitions of a vanishing state share the
/// probability mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Proportional to the evaluated weight expression.
    #[default]
    WeightProportional,
    /// `1 / N` for `N` enabled immediate transitions.
    Uniform,
}

/// Read-only view of the net shared by every variant.
#[derive(Debug)]
pub struct NetSemantics<'n> {
    net: &'n Net,
    rates: RateTable,
    classifier: StateClassifier<'n>,
}

impl<'n> NetSemantics<'n> {
    pub fn new(net: &'n Net) -> Self {
        Self {
            net,
            rates: RateTable::compile(net),
            classifier: StateClassifier::new(net),
        }
    }
}

#[derive(Debug)]
pub enum ExplorerUtilities<'n> {
    /// Aborts once more than `max_states` states are discovered.
    Bounded {
        semantics: NetSemantics<'n>,
        max_states: usize,
    },
    Unbounded { semantics: NetSemantics<'n> },
    /// Unbounded exploration with Karp–Miller acceleration.
    Coverability {
        semantics: NetSemantics<'n>,
        tree: CoverabilityTree,
    },
}

impl<'n> ExplorerUtilities<'n> {
    pub fn bounded(net: &'n Net, max_states: usize) -> Self {
        ExplorerUtilities::Bounded {
            semantics: NetSemantics::new(net),
            max_states,
        }
    }

    pub fn unbounded(net: &'n Net) -> Self {
        ExplorerUtilities::Unbounded {
            semantics: NetSemantics::new(net),
        }
    }

    /// Fails when a place restricts its capacity: omega counts cannot honour it.
    pub fn coverability(net: &'n Net) -> Result<Self, ExplorationError> {
        if let Some(place) = net.capacity_restricted_place() {
            return Err(ExplorationError::CapacityRestricted {
                place: net.places[place].name.clone(),
            });
        }
        Ok(ExplorerUtilities::Coverability {
            semantics: NetSemantics::new(net),
            tree: CoverabilityTree::new(),
        })
    }

    fn semantics(&self) -> &NetSemantics<'n> {
        match self {
            ExplorerUtilities::Bounded { semantics, .. }
            | ExplorerUtilities::Unbounded { semantics }
            | ExplorerUtilities::Coverability { semantics, .. } => semantics,
        }
    }

    pub fn net(&self) -> &'n Net {
        self.semantics().net
    }

    pub fn max_states(&self) -> Option<usize> {
        match self {
            ExplorerUtilities::Bounded { max_states, .. } => Some(*max_states),
            ExplorerUtilities::Unbounded { .. } | ExplorerUtilities::Coverability { .. } => None,
        }
    }

    pub fn classify(&self, marking: Marking) -> ClassifiedState {
        self.semantics().classifier.classify(marking)
    }

    pub fn initial_state(&self) -> ClassifiedState {
        self.classify(self.net().initial_marking())
    }

    pub fn label(&self, transition: TransitionId) -> String {
        self.net().transitions[transition].name.clone()
    }

    /// Enabled transitions in ascending id order.
    pub fn enabled_transitions(&self, state: &ClassifiedState) -> Vec<TransitionId> {
        self.net().enabled_transitions(&state.marking)
    }

    /// Fires `transition` in `state`.
    pub fn successor(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<ClassifiedState, ExplorationError> {
        self.fire(state, transition).map(|marking| self.classify(marking))
    }

    /// Turns a target reached from `source` into the state that gets
    /// claimed. Coverability folds it against the ancestors of `source`
    /// and classifies it again when a coordinate became ω.
    pub fn finalise(&self, source: StateId, state: ClassifiedState) -> ClassifiedState {
        match self {
            ExplorerUtilities::Coverability { tree, .. } => {
                let marking = tree.accelerate(source, state.marking.clone());
                if marking == state.marking {
                    state
                } else {
                    self.classify(marking)
                }
            }
            ExplorerUtilities::Bounded { .. } | ExplorerUtilities::Unbounded { .. } => state,
        }
    }

    pub fn successors(
        &self,
        state: &ClassifiedState,
    ) -> Result<IndexMap<TransitionId, ClassifiedState>, ExplorationError> {
        self.enabled_transitions(state)
            .into_iter()
            .map(|transition| Ok((transition, self.successor(state, transition)?)))
            .collect()
    }

    /// Rate of a timed transition, scaled by the enabling degree for
    /// infinite-server semantics. An ω degree counts as one.
    pub fn rate(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<f64, ExplorationError> {
        let rate = self.evaluate(state, transition)?;
        if self.net().transitions[transition].infinite_server {
            let degree = self
                .net()
                .enabling_degree(&state.marking, transition)
                .unwrap_or(1);
            Ok(rate * degree as f64)
        } else {
            Ok(rate)
        }
    }

    /// Normalised firing probabilities of the enabled transitions of a
    /// vanishing state.
    pub fn branching_probabilities(
        &self,
        state: &ClassifiedState,
        policy: ConflictPolicy,
    ) -> Result<Vec<(TransitionId, f64)>, ExplorationError> {
        let enabled = self.enabled_transitions(state);
        let weights = match policy {
            ConflictPolicy::Uniform => enabled.iter().map(|t| (*t, 1.0)).collect::<Vec<_>>(),
            ConflictPolicy::WeightProportional => enabled
                .iter()
                .map(|t| Ok((*t, self.evaluate(state, *t)?)))
                .collect::<Result<Vec<_>, ExplorationError>>()?,
        };
        let total: f64 = weights.iter().map(|(_, weight)| weight).sum();
        if total <= 0.0 {
            let transition = enabled.first().map(|t| self.label(*t)).unwrap_or_default();
            return Err(ExplorationError::Rate {
                transition,
                reason: RateError::ZeroWeight,
                state: None,
            });
        }
        Ok(weights
            .into_iter()
            .map(|(transition, weight)| (transition, weight / total))
            .collect())
    }

    /// Checks the ceiling after the `discovered`-th state was claimed.
    pub fn admit(&self, discovered: usize) -> Result<(), ExplorationError> {
        match self {
            ExplorerUtilities::Bounded { max_states, .. } if discovered > *max_states => {
                Err(ExplorationError::ExplorationBoundExceeded { limit: *max_states })
            }
            _ => Ok(()),
        }
    }

    /// Remembers where a newly claimed state came from.
    pub fn discovered(&self, state: StateId, parent: Option<StateId>, marking: &Marking) {
        if let ExplorerUtilities::Coverability { tree, .. } = self {
            tree.discovered(state, parent, marking);
        }
    }

    fn fire(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<Marking, ExplorationError> {
        self.net()
            .fire_transition(&state.marking, transition)
            .map_err(|err| {
                let transition = match err {
                    FireError::OutOfBounds(id) => format!("{id:?}"),
                    FireError::NotEnabled(id) => self.label(id),
                };
                ExplorationError::InvalidFiring {
                    transition,
                    state: None,
                }
            })
    }

    fn evaluate(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<f64, ExplorationError> {
        self.semantics()
            .rates
            .evaluate(self.net(), &state.marking, transition)
            .map_err(|reason| ExplorationError::Rate {
                transition: self.label(transition),
                reason,
                state: None,
            })
    }
}
