//! 状态空间探索: 工作表算法、并发工作者池与消失状态折叠.
//!
//! 工作者从共享前沿取出状态，计算后继并通过访问表原子地认领新标识。
//! 首个错误取消所有工作者，部分结果被丢弃.

pub mod coverability;
pub mod error;
pub mod frontier;
pub mod utilities;
pub mod vanishing;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::config::ExplorerConfig;
use crate::net::ids::{StateId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::Net;
use crate::state::{ClassifiedState, Marking};
use crate::store::{Record, StateSpaceStore};

pub use coverability::CoverabilityTree;
pub use error::ExplorationError;
pub use frontier::Frontier;
pub use utilities::{ConflictPolicy, ExplorerUtilities};
pub use vanishing::{Folded, VanishingExplorer, VanishingGraph, VanishingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationMode {
    #[default]
    Bounded,
    Unbounded,
    Coverability,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSpaceExplorerResults {
    pub number_of_states: usize,
    /// Edges over all records.
    pub processed_transitions: usize,
}

#[derive(Debug)]
pub struct ExploredStateSpace {
    pub results: StateSpaceExplorerResults,
    pub store: StateSpaceStore,
}

pub struct StateSpaceExplorer<'n> {
    utilities: ExplorerUtilities<'n>,
    vanishing: VanishingExplorer,
    threads: usize,
}

impl<'n> StateSpaceExplorer<'n> {
    pub fn new(utilities: ExplorerUtilities<'n>, vanishing: VanishingExplorer) -> Self {
        Self {
            utilities,
            vanishing,
            threads: 1,
        }
    }

    pub fn from_config(net: &'n Net, config: &ExplorerConfig) -> Result<Self, ExplorationError> {
        let utilities = match config.mode {
            ExplorationMode::Bounded => ExplorerUtilities::bounded(net, config.max_states),
            ExplorationMode::Unbounded => ExplorerUtilities::unbounded(net),
            ExplorationMode::Coverability => ExplorerUtilities::coverability(net)?,
        };
        let vanishing = match VanishingExplorer::new(config.vanishing, config.conflict_policy) {
            VanishingExplorer::OnTheFly { policy, .. } => VanishingExplorer::OnTheFly {
                policy,
                epsilon: config.epsilon,
                max_iterations: config.max_vanishing_iterations,
            },
            VanishingExplorer::Simple { policy, .. } => VanishingExplorer::Simple {
                policy,
                max_states: config.max_vanishing_iterations,
            },
            no_op => no_op,
        };
        Ok(Self::new(utilities, vanishing).with_threads(config.threads))
    }

    /// Worker count, at least one. One worker assigns ids deterministically.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn utilities(&self) -> &ExplorerUtilities<'n> {
        &self.utilities
    }

    pub fn explore(self) -> Result<ExploredStateSpace, ExplorationError> {
        let net = self.utilities.net();
        log::info!(
            "exploring {} places / {} transitions with {} worker(s), {:?}",
            net.places_len(),
            net.transitions_len(),
            self.threads,
            self.vanishing
        );

        let run = Run {
            utilities: &self.utilities,
            vanishing: &self.vanishing,
            visited: DashMap::with_hasher(FxBuildHasher),
            folds: DashMap::with_hasher(FxBuildHasher),
            next_id: AtomicUsize::new(0),
            frontier: Frontier::new(),
            error: Mutex::new(None),
        };

        let mut states = Vec::new();
        for seed in self.seeds()? {
            let (id, fresh) = run.claim(&seed, None)?;
            if fresh {
                states.push((id, seed.clone()));
                run.frontier.push((id, seed));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|index| format!("pnss-explorer-{index}"))
            .build()
            .map_err(|err| ExplorationError::WorkerPool(err.to_string()))?;
        let outputs = pool.broadcast(|_| run.work());

        if let Some(err) = run.error.into_inner() {
            log::warn!("exploration aborted: {err}");
            return Err(err);
        }

        let mut records = Vec::new();
        for output in outputs {
            states.extend(output.states);
            records.extend(output.records);
        }
        let (places, tokens) = StateSpaceStore::layout_of(net);
        let store = StateSpaceStore::from_parts(places, tokens, states, records)
            .map_err(|err| ExplorationError::Inconsistent(err.to_string()))?;
        let results = StateSpaceExplorerResults {
            number_of_states: store.len(),
            processed_transitions: store.edge_count(),
        };
        log::info!(
            "Results: {} states and {} transitions",
            results.number_of_states,
            results.processed_transitions
        );
        Ok(ExploredStateSpace { results, store })
    }

    /// States the frontier starts from: the initial marking, or the tangible
    /// states it folds into when it is vanishing.
    fn seeds(&self) -> Result<Vec<ClassifiedState>, ExplorationError> {
        let initial = self.utilities.initial_state();
        if initial.is_tangible() || !self.vanishing.eliminates_vanishing() {
            return Ok(vec![initial]);
        }
        log::debug!("initial marking {} is vanishing, folding it", initial.marking);
        let folded = self
            .vanishing
            .explore(
                initial,
                1.0,
                BTreeSet::new(),
                &self.utilities,
            )
            .map_err(|err| err.with_state(StateId::INITIAL))?;
        Ok(folded.into_iter().map(|folded| folded.state).collect())
    }
}

#[derive(Debug, Default)]
struct WorkerOutput {
    states: Vec<(StateId, ClassifiedState)>,
    records: Vec<Record>,
}

/// State shared by the workers of one run.
struct Run<'a, 'n> {
    utilities: &'a ExplorerUtilities<'n>,
    vanishing: &'a VanishingExplorer,
    visited: DashMap<Marking, StateId, FxBuildHasher>,
    /// Unit-rate folds of vanishing markings already eliminated.
    folds: DashMap<Marking, Vec<Folded>, FxBuildHasher>,
    next_id: AtomicUsize,
    frontier: Frontier<(StateId, ClassifiedState)>,
    error: Mutex<Option<ExplorationError>>,
}

impl Run<'_, '_> {
    fn work(&self) -> WorkerOutput {
        let mut output = WorkerOutput::default();
        while let Some((id, state)) = self.frontier.next() {
            match self.expand(id, &state, &mut output.states) {
                Ok(record) => output.records.push(record),
                Err(err) => self.fail(err.with_state(id)),
            }
            self.frontier.done();
        }
        output
    }

    /// Insert-if-absent on the visited table. The id is drawn while the
    /// shard of the marking is locked, so a marking gets exactly one id.
    fn claim(
        &self,
        state: &ClassifiedState,
        parent: Option<StateId>,
    ) -> Result<(StateId, bool), ExplorationError> {
        let id = match self.visited.entry(state.marking.clone()) {
            Entry::Occupied(entry) => return Ok((*entry.get(), false)),
            Entry::Vacant(entry) => {
                let index = self.next_id.fetch_add(1, Ordering::SeqCst);
                self.utilities.admit(index + 1)?;
                let id = StateId::from_usize(index);
                entry.insert(id);
                id
            }
        };
        self.utilities.discovered(id, parent, &state.marking);
        if id.index() > 0 && id.index() % 10_000 == 0 {
            log::debug!("{} states discovered, {} queued", id.index(), self.frontier.len());
        }
        Ok((id, true))
    }

    fn expand(
        &self,
        id: StateId,
        state: &ClassifiedState,
        discovered: &mut Vec<(StateId, ClassifiedState)>,
    ) -> Result<Record, ExplorationError> {
        let mut record = Record::new(id);
        let contributions: Vec<(TransitionId, f64)> = if state.is_tangible() {
            self.utilities
                .enabled_transitions(state)
                .into_iter()
                .map(|transition| Ok((transition, self.utilities.rate(state, transition)?)))
                .collect::<Result<_, ExplorationError>>()?
        } else {
            self.utilities
                .branching_probabilities(state, self.vanishing.policy())?
        };

        for (transition, rate) in contributions {
            if self.frontier.is_cancelled() {
                break;
            }
            let next = self.utilities.successor(state, transition)?;
            let label = self.utilities.label(transition);
            for folded in self.fold(next, rate, label)? {
                let reached = self.utilities.finalise(id, folded.state);
                let (target, fresh) = self.claim(&reached, Some(id))?;
                if fresh {
                    discovered.push((target, reached.clone()));
                    self.frontier.push((target, reached));
                }
                record.add(target, folded.rate, folded.labels);
            }
        }
        log::trace!("expanded {id} {:?}: {} successor(s)", state, record.len());
        Ok(record)
    }

    /// Targets of `next`, entered with `rate` through `label`. A vanishing
    /// marking is folded once at unit rate and the result is reused for
    /// every later predecessor.
    fn fold(
        &self,
        next: ClassifiedState,
        rate: f64,
        label: String,
    ) -> Result<Vec<Folded>, ExplorationError> {
        if next.is_tangible() || !self.vanishing.eliminates_vanishing() {
            return self
                .vanishing
                .explore(next, rate, BTreeSet::from([label]), self.utilities);
        }
        // The shard guard must be gone before folding inserts.
        let cached = self.folds.get(&next.marking).map(|entry| entry.value().clone());
        let unit = match cached {
            Some(unit) => unit,
            None => {
                let marking = next.marking.clone();
                let unit = self
                    .vanishing
                    .explore(next, 1.0, BTreeSet::new(), self.utilities)?;
                self.folds.entry(marking).or_insert(unit).value().clone()
            }
        };
        Ok(unit
            .into_iter()
            .map(|mut folded| {
                folded.rate *= rate;
                folded.labels.insert(label.clone());
                folded
            })
            .collect())
    }

    /// Keeps the first error and stops every worker.
    fn fail(&self, err: ExplorationError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        self.frontier.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, Transition, DEFAULT_TOKEN};

    fn consume_net() -> Net {
        let mut net = Net::empty();
        let p = net.add_place(
            Place::new("P")
                .with_tokens(DEFAULT_TOKEN, 1)
                .with_capacity(1),
        );
        let t = net.add_transition(Transition::new("T"));
        net.add_input_arc(p, t, 1);
        net
    }

    #[test]
    fn consuming_transition_gives_two_states() {
        let net = consume_net();
        let explored = StateSpaceExplorer::new(
            ExplorerUtilities::bounded(&net, 10),
            VanishingExplorer::default(),
        )
        .explore()
        .unwrap();

        assert_eq!(
            explored.results,
            StateSpaceExplorerResults {
                number_of_states: 2,
                processed_transitions: 1,
            }
        );
        let store = explored.store;
        let edge = store.record(StateId::new(0)).unwrap();
        let successor = edge.get(StateId::new(1)).unwrap();
        assert_eq!(successor.rate, 1.0);
        assert_eq!(successor.label(), "T");
        assert!(store.record(StateId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn ceiling_aborts_the_run() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("P"));
        let t = net.add_transition(Transition::new("grow"));
        net.add_output_arc(p, t, 1);

        let err = StateSpaceExplorer::new(
            ExplorerUtilities::bounded(&net, 5),
            VanishingExplorer::default(),
        )
        .with_threads(3)
        .explore()
        .unwrap_err();
        assert_eq!(err, ExplorationError::ExplorationBoundExceeded { limit: 5 });
    }

    #[test]
    fn coverability_terminates_on_growing_net() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("P"));
        let t = net.add_transition(Transition::new("grow"));
        net.add_output_arc(p, t, 1);

        let explored = StateSpaceExplorer::new(
            ExplorerUtilities::coverability(&net).unwrap(),
            VanishingExplorer::default(),
        )
        .explore()
        .unwrap();
        assert_eq!(explored.results.number_of_states, 2);
        let omega = explored.store.state(StateId::new(1)).unwrap();
        assert!(omega.marking.has_omega());
        let self_loop = explored.store.record(StateId::new(1)).unwrap();
        assert!(self_loop.get(StateId::new(1)).is_some());
    }

    #[test]
    fn vanishing_folds_are_reused_across_predecessors() {
        let mut net = Net::empty();
        let v = net.add_place(Place::new("V"));
        let a = net.add_place(Place::new("A"));
        let b = net.add_place(Place::new("B"));
        let to_a = net.add_transition(Transition::immediate("to_a").with_rate("3"));
        let to_b = net.add_transition(Transition::immediate("to_b"));
        net.add_input_arc(v, to_a, 1);
        net.add_output_arc(a, to_a, 1);
        net.add_input_arc(v, to_b, 1);
        net.add_output_arc(b, to_b, 1);

        let utilities = ExplorerUtilities::unbounded(&net);
        let vanishing = VanishingExplorer::on_the_fly(ConflictPolicy::WeightProportional);
        let run = Run {
            utilities: &utilities,
            vanishing: &vanishing,
            visited: DashMap::with_hasher(FxBuildHasher),
            folds: DashMap::with_hasher(FxBuildHasher),
            next_id: AtomicUsize::new(0),
            frontier: Frontier::new(),
            error: Mutex::new(None),
        };
        let entered =
            utilities.classify(Marking::from_counts(1, vec![1.into(), 0.into(), 0.into()]));
        assert!(entered.is_vanishing());

        let first = run.fold(entered.clone(), 2.0, "x".into()).unwrap();
        let second = run.fold(entered, 4.0, "y".into()).unwrap();
        assert_eq!(run.folds.len(), 1);
        assert_eq!(
            first.iter().map(|f| f.rate).collect::<Vec<_>>(),
            vec![1.5, 0.5]
        );
        assert_eq!(
            second.iter().map(|f| f.rate).collect::<Vec<_>>(),
            vec![3.0, 1.0]
        );
        assert!(second[0].labels.contains("y") && !second[0].labels.contains("x"));
        assert!(second[0].labels.contains("to_a"));
    }
}
