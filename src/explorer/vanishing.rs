//! Elimination of vanishing states.
//!
//! A vanishing state is left in zero time through one of its enabled
//! immediate transitions. Folding it replaces the state by the tangible
//! states it eventually reaches: path probabilities multiply, labels union
//! along the path and parallel paths to one target add up.
use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::explorer::error::ExplorationError;
use crate::explorer::utilities::{ConflictPolicy, ExplorerUtilities};
use crate::state::{ClassifiedState, Marking};

pub const DEFAULT_EPSILON: f64 = 1e-7;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VanishingStrategy {
    Simple,
    #[default]
    OnTheFly,
    NoOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VanishingExplorer {
    /// Materialises the vanishing sub-graph and solves it exactly.
    Simple {
        policy: ConflictPolicy,
        max_states: usize,
    },
    /// Pushes probability mass through a stack, dropping masses below
    /// `epsilon`.
    OnTheFly {
        policy: ConflictPolicy,
        epsilon: f64,
        max_iterations: usize,
    },
    /// Keeps vanishing states in the graph.
    NoOp { policy: ConflictPolicy },
}

/// A tangible target reached from a vanishing state.
#[derive(Debug, Clone, PartialEq)]
pub struct Folded {
    pub state: ClassifiedState,
    pub rate: f64,
    pub labels: BTreeSet<String>,
}

impl Folded {
    fn merge(&mut self, rate: f64, labels: &BTreeSet<String>) {
        self.rate += rate;
        self.labels.extend(labels.iter().cloned());
    }
}

impl Default for VanishingExplorer {
    fn default() -> Self {
        Self::on_the_fly(ConflictPolicy::default())
    }
}

impl VanishingExplorer {
    pub fn new(strategy: VanishingStrategy, policy: ConflictPolicy) -> Self {
        match strategy {
            VanishingStrategy::Simple => Self::simple(policy),
            VanishingStrategy::OnTheFly => Self::on_the_fly(policy),
            VanishingStrategy::NoOp => Self::no_op(policy),
        }
    }

    pub fn simple(policy: ConflictPolicy) -> Self {
        VanishingExplorer::Simple {
            policy,
            max_states: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn on_the_fly(policy: ConflictPolicy) -> Self {
        VanishingExplorer::OnTheFly {
            policy,
            epsilon: DEFAULT_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn no_op(policy: ConflictPolicy) -> Self {
        VanishingExplorer::NoOp { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        match self {
            VanishingExplorer::Simple { policy, .. }
            | VanishingExplorer::OnTheFly { policy, .. }
            | VanishingExplorer::NoOp { policy } => *policy,
        }
    }

    /// False for `NoOp`, whose vanishing states stay in the graph.
    pub fn eliminates_vanishing(&self) -> bool {
        !matches!(self, VanishingExplorer::NoOp { .. })
    }

    /// Tangible targets of `state`, entered with `rate` through `labels`.
    ///
    /// Paths are fired without coverability acceleration; only the targets
    /// become explored states. Tangible inputs are returned unchanged.
    pub fn explore(
        &self,
        state: ClassifiedState,
        rate: f64,
        labels: BTreeSet<String>,
        utilities: &ExplorerUtilities<'_>,
    ) -> Result<Vec<Folded>, ExplorationError> {
        if state.is_tangible() {
            return Ok(vec![Folded {
                state,
                rate,
                labels,
            }]);
        }
        match self {
            VanishingExplorer::NoOp { .. } => Ok(vec![Folded {
                state,
                rate,
                labels,
            }]),
            VanishingExplorer::OnTheFly {
                policy,
                epsilon,
                max_iterations,
            } => on_the_fly(
                state,
                rate,
                labels,
                utilities,
                *policy,
                *epsilon,
                *max_iterations,
            ),
            VanishingExplorer::Simple { policy, max_states } => {
                let graph = VanishingGraph::build(state, utilities, *policy, *max_states)?;
                graph.fold(rate, &labels)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn on_the_fly(
    state: ClassifiedState,
    rate: f64,
    labels: BTreeSet<String>,
    utilities: &ExplorerUtilities<'_>,
    policy: ConflictPolicy,
    epsilon: f64,
    max_iterations: usize,
) -> Result<Vec<Folded>, ExplorationError> {
    let mut targets: IndexMap<Marking, Folded> = IndexMap::new();
    let mut stack = vec![(state, 1.0_f64, labels)];
    let mut iterations = 0;

    while let Some((vanishing, mass, path_labels)) = stack.pop() {
        iterations += 1;
        if iterations > max_iterations {
            return Err(ExplorationError::TimelessTrap {
                state: None,
                iterations: max_iterations,
            });
        }
        for (transition, probability) in utilities.branching_probabilities(&vanishing, policy)? {
            let next = utilities.successor(&vanishing, transition)?;
            let next_mass = mass * probability;
            let mut next_labels = path_labels.clone();
            next_labels.insert(utilities.label(transition));
            if next.is_vanishing() {
                if next_mass > epsilon {
                    stack.push((next, next_mass, next_labels));
                }
            } else {
                let contribution = rate * next_mass;
                match targets.get_mut(&next.marking) {
                    Some(folded) => folded.merge(contribution, &next_labels),
                    None => {
                        targets.insert(
                            next.marking.clone(),
                            Folded {
                                state: next,
                                rate: contribution,
                                labels: next_labels,
                            },
                        );
                    }
                }
            }
        }
    }

    log::trace!("folded vanishing path in {iterations} iteration(s)");
    Ok(targets.into_values().collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Vanishing(usize),
    Tangible(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VanishingEdge {
    pub target: Target,
    pub probability: f64,
    pub label: String,
}

/// The vanishing states reachable from one entry state, their branching
/// edges and the tangible states they exit to. Node 0 is the entry.
#[derive(Debug, Clone, Default)]
pub struct VanishingGraph {
    pub nodes: IndexMap<Marking, Vec<VanishingEdge>>,
    pub exits: IndexMap<Marking, ClassifiedState>,
}

impl VanishingGraph {
    pub fn build(
        entry: ClassifiedState,
        utilities: &ExplorerUtilities<'_>,
        policy: ConflictPolicy,
        max_states: usize,
    ) -> Result<Self, ExplorationError> {
        let mut graph = VanishingGraph::default();
        let mut queue = VecDeque::new();
        graph.nodes.insert(entry.marking.clone(), Vec::new());
        queue.push_back(entry);

        while let Some(vanishing) = queue.pop_front() {
            let mut edges = Vec::new();
            for (transition, probability) in utilities.branching_probabilities(&vanishing, policy)? {
                let next = utilities.successor(&vanishing, transition)?;
                let target = if next.is_vanishing() {
                    match graph.nodes.get_index_of(&next.marking) {
                        Some(index) => Target::Vanishing(index),
                        None => {
                            if graph.nodes.len() >= max_states {
                                return Err(ExplorationError::TimelessTrap {
                                    state: None,
                                    iterations: graph.nodes.len(),
                                });
                            }
                            let (index, _) = graph.nodes.insert_full(next.marking.clone(), Vec::new());
                            queue.push_back(next);
                            Target::Vanishing(index)
                        }
                    }
                } else {
                    let (index, _) = graph.exits.insert_full(next.marking.clone(), next);
                    Target::Tangible(index)
                };
                edges.push(VanishingEdge {
                    target,
                    probability,
                    label: utilities.label(transition),
                });
            }
            if let Some(slot) = graph.nodes.get_mut(&vanishing.marking) {
                *slot = edges;
            }
        }

        graph.check_escapes()?;
        Ok(graph)
    }

    /// Every vanishing node must reach a tangible exit.
    fn check_escapes(&self) -> Result<(), ExplorationError> {
        let escapes = self.reaching(|edges| {
            edges
                .iter()
                .any(|edge| matches!(edge.target, Target::Tangible(_)))
        });
        let trapped = escapes.iter().filter(|escape| !**escape).count();
        if trapped > 0 {
            log::debug!(
                "{trapped} of {} vanishing states cannot reach a tangible state",
                self.nodes.len()
            );
            return Err(ExplorationError::TimelessTrap {
                state: None,
                iterations: self.nodes.len(),
            });
        }
        Ok(())
    }

    /// Nodes that reach, through vanishing edges, a node satisfying `seed`.
    fn reaching(&self, seed: impl Fn(&[VanishingEdge]) -> bool) -> Vec<bool> {
        let mut reached: Vec<bool> = self.nodes.values().map(|edges| seed(edges.as_slice())).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for (index, edges) in self.nodes.values().enumerate() {
                if reached[index] {
                    continue;
                }
                let hit = edges.iter().any(|edge| match edge.target {
                    Target::Vanishing(next) => reached[next],
                    Target::Tangible(_) => false,
                });
                if hit {
                    reached[index] = true;
                    changed = true;
                }
            }
        }
        reached
    }

    /// Expected number of visits of every vanishing node, starting at node 0.
    ///
    /// Solves `(I - Q)^T x = e0`, `Q` being the vanishing-to-vanishing
    /// probabilities.
    pub fn visits(&self) -> Result<Vec<f64>, ExplorationError> {
        let n = self.nodes.len();
        let mut matrix = vec![vec![0.0_f64; n + 1]; n];
        for (row, line) in matrix.iter_mut().enumerate() {
            line[row] = 1.0;
        }
        matrix[0][n] = 1.0;
        for (from, edges) in self.nodes.values().enumerate() {
            for edge in edges {
                if let Target::Vanishing(to) = edge.target {
                    matrix[to][from] -= edge.probability;
                }
            }
        }

        for column in 0..n {
            let pivot = (column..n)
                .max_by(|a, b| matrix[*a][column].abs().total_cmp(&matrix[*b][column].abs()))
                .unwrap_or(column);
            if matrix[pivot][column].abs() < f64::EPSILON {
                return Err(ExplorationError::TimelessTrap {
                    state: None,
                    iterations: n,
                });
            }
            matrix.swap(column, pivot);
            let head = matrix[column].clone();
            for (row, line) in matrix.iter_mut().enumerate() {
                if row == column {
                    continue;
                }
                let factor = line[column] / head[column];
                if factor != 0.0 {
                    for (cell, top) in line.iter_mut().zip(head.iter()).skip(column) {
                        *cell -= factor * top;
                    }
                }
            }
        }

        Ok(matrix
            .iter()
            .enumerate()
            .map(|(row, line)| line[n] / line[row])
            .collect())
    }

    /// Absorption probabilities into each exit, scaled by `rate`.
    pub fn fold(&self, rate: f64, labels: &BTreeSet<String>) -> Result<Vec<Folded>, ExplorationError> {
        let visits = self.visits()?;
        let mut folded: Vec<Folded> = self
            .exits
            .values()
            .map(|state| Folded {
                state: state.clone(),
                rate: 0.0,
                labels: labels.clone(),
            })
            .collect();

        for (exit, target) in folded.iter_mut().enumerate() {
            let leads_to_exit = self.reaching(|edges| {
                edges
                    .iter()
                    .any(|edge| edge.target == Target::Tangible(exit))
            });
            for (from, edges) in self.nodes.values().enumerate() {
                for edge in edges {
                    match edge.target {
                        Target::Tangible(to) if to == exit => {
                            target.rate += rate * visits[from] * edge.probability;
                            target.labels.insert(edge.label.clone());
                        }
                        Target::Vanishing(to) if leads_to_exit[to] => {
                            target.labels.insert(edge.label.clone());
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, Transition, DEFAULT_TOKEN};
    use crate::net::Net;

    /// V --I1(0.5)--> A, V --I2(0.5)--> W, W --I3--> V or --I4--> B.
    fn looping_net() -> Net {
        let mut net = Net::empty();
        let v = net.add_place(Place::new("V").with_tokens(DEFAULT_TOKEN, 1));
        let w = net.add_place(Place::new("W"));
        let a = net.add_place(Place::new("A"));
        let b = net.add_place(Place::new("B"));
        let i1 = net.add_transition(Transition::immediate("I1"));
        let i2 = net.add_transition(Transition::immediate("I2"));
        let i3 = net.add_transition(Transition::immediate("I3"));
        let i4 = net.add_transition(Transition::immediate("I4"));
        net.add_input_arc(v, i1, 1);
        net.add_output_arc(a, i1, 1);
        net.add_input_arc(v, i2, 1);
        net.add_output_arc(w, i2, 1);
        net.add_input_arc(w, i3, 1);
        net.add_output_arc(v, i3, 1);
        net.add_input_arc(w, i4, 1);
        net.add_output_arc(b, i4, 1);
        net
    }

    fn rates(folded: &[Folded]) -> Vec<(String, f64)> {
        folded
            .iter()
            .map(|f| (f.state.marking.to_string(), f.rate))
            .collect()
    }

    #[test]
    fn simple_solves_vanishing_cycles_exactly() {
        let net = looping_net();
        let utilities = ExplorerUtilities::unbounded(&net);
        let folded = VanishingExplorer::simple(ConflictPolicy::Uniform)
            .explore(
                utilities.initial_state(),
                2.0,
                BTreeSet::new(),
                &utilities,
            )
            .unwrap();

        // A with 2/3, B with 1/3 of the entering rate.
        let found = rates(&folded);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "(0,0,1,0)");
        assert!((found[0].1 - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(found[1].0, "(0,0,0,1)");
        assert!((found[1].1 - 2.0 / 3.0).abs() < 1e-9);
        assert!(folded[1].labels.contains("I3"));
    }

    #[test]
    fn on_the_fly_approximates_within_epsilon() {
        let net = looping_net();
        let utilities = ExplorerUtilities::unbounded(&net);
        let folded = VanishingExplorer::on_the_fly(ConflictPolicy::Uniform)
            .explore(utilities.initial_state(), 1.0, BTreeSet::new(), &utilities)
            .unwrap();
        let total: f64 = folded.iter().map(|f| f.rate).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn trapped_cycle_is_reported_by_both_strategies() {
        let mut net = Net::empty();
        let v = net.add_place(Place::new("V").with_tokens(DEFAULT_TOKEN, 1));
        let w = net.add_place(Place::new("W"));
        let there = net.add_transition(Transition::immediate("there"));
        let back = net.add_transition(Transition::immediate("back"));
        net.add_input_arc(v, there, 1);
        net.add_output_arc(w, there, 1);
        net.add_input_arc(w, back, 1);
        net.add_output_arc(v, back, 1);

        let utilities = ExplorerUtilities::unbounded(&net);
        for explorer in [
            VanishingExplorer::simple(ConflictPolicy::default()),
            VanishingExplorer::on_the_fly(ConflictPolicy::default()),
        ] {
            let err = explorer
                .explore(utilities.initial_state(), 1.0, BTreeSet::new(), &utilities)
                .unwrap_err();
            assert!(err.is_timeless_trap(), "{explorer:?}: {err}");
        }
    }

    #[test]
    fn no_op_keeps_the_vanishing_state() {
        let net = looping_net();
        let utilities = ExplorerUtilities::unbounded(&net);
        let initial = utilities.initial_state();
        let folded = VanishingExplorer::no_op(ConflictPolicy::Uniform)
            .explore(initial.clone(), 1.0, BTreeSet::new(), &utilities)
            .unwrap();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].state, initial);
    }
}
