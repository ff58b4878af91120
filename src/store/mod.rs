//! Explored state space: states, their ids and successor records.

pub mod binary;
pub mod graph;
pub mod record;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::net::ids::StateId;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::Net;
use crate::state::{ClassifiedState, Marking};

pub use graph::{EdgeView, GraphOptions, StateView};
pub use record::{Record, Successor};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a {expected} file (bad magic or kind)")]
    BadMagic { expected: &'static str },
    #[error("unsupported store version {0}")]
    UnsupportedVersion(u16),
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("state ids are not dense: expected {expected}, found {found}")]
    NonDenseIds { expected: StateId, found: StateId },
    #[error("record of {state} points to unknown state {successor}")]
    UnknownSuccessor { state: StateId, successor: StateId },
    #[error("more than one record for {0}")]
    DuplicateRecord(StateId),
    #[error("state {0} does not match the place/token layout")]
    Layout(StateId),
}

/// Bidirectional id/state mapping plus one record per state.
///
/// Built once by the explorer (or loaded from disk) and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceStore {
    places: Vec<String>,
    tokens: Vec<String>,
    states: IndexVec<StateId, ClassifiedState>,
    index: FxHashMap<Marking, StateId>,
    records: IndexVec<StateId, Record>,
}

impl StateSpaceStore {
    /// Assembles a store from states and records in any order.
    ///
    /// Ids must be dense from zero, every state gets exactly one record
    /// (missing ones are empty) and every successor must be a known state.
    pub fn from_parts(
        places: Vec<String>,
        tokens: Vec<String>,
        mut states: Vec<(StateId, ClassifiedState)>,
        mut records: Vec<Record>,
    ) -> Result<Self, StoreError> {
        states.sort_by_key(|(id, _)| *id);
        records.sort_by_key(|record| record.state);

        let width = places.len() * tokens.len();
        let mut index = FxHashMap::default();
        let mut dense: IndexVec<StateId, ClassifiedState> = IndexVec::with_capacity(states.len());
        for (id, state) in states {
            let expected = dense.next_index();
            if id != expected {
                return Err(StoreError::NonDenseIds {
                    expected,
                    found: id,
                });
            }
            if state.marking.counts().len() != width
                || state.marking.token_types() != tokens.len()
            {
                return Err(StoreError::Layout(id));
            }
            index.insert(state.marking.clone(), id);
            dense.push(state);
        }
        if index.len() != dense.len() {
            return Err(StoreError::Corrupt("two ids share one marking".into()));
        }

        let mut slots: Vec<Option<Record>> = vec![None; dense.len()];
        for record in records {
            let Some(slot) = slots.get_mut(record.state.index()) else {
                return Err(StoreError::Corrupt(format!(
                    "record for unknown state {}",
                    record.state
                )));
            };
            if slot.is_some() {
                return Err(StoreError::DuplicateRecord(record.state));
            }
            if let Some(successor) = record.targets().find(|target| target.index() >= dense.len())
            {
                return Err(StoreError::UnknownSuccessor {
                    state: record.state,
                    successor,
                });
            }
            *slot = Some(record);
        }
        let records = slots
            .into_iter()
            .enumerate()
            .map(|(idx, record)| record.unwrap_or_else(|| Record::new(StateId::from_usize(idx))))
            .collect();

        Ok(Self {
            places,
            tokens,
            states: dense,
            index,
            records,
        })
    }

    /// Place and token names of `net`, in id order.
    pub(crate) fn layout_of(net: &Net) -> (Vec<String>, Vec<String>) {
        (
            net.places.iter().map(|place| place.name.clone()).collect(),
            net.tokens.iter().map(|token| token.name.clone()).collect(),
        )
    }

    pub fn place_names(&self) -> &[String] {
        &self.places
    }

    pub fn token_names(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of (state, successor) edges over all records.
    pub fn edge_count(&self) -> usize {
        self.records.iter().map(Record::len).sum()
    }

    pub fn state(&self, id: StateId) -> Option<&ClassifiedState> {
        self.states.get(id)
    }

    pub fn id_of(&self, marking: &Marking) -> Option<StateId> {
        self.index.get(marking).copied()
    }

    pub fn record(&self, id: StateId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &ClassifiedState)> + '_ {
        self.states.iter_enumerated()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.iter()
    }

    pub fn is_tangible(&self, id: StateId) -> bool {
        self.state(id).is_some_and(ClassifiedState::is_tangible)
    }

    pub fn is_vanishing(&self, id: StateId) -> bool {
        self.state(id).is_some_and(ClassifiedState::is_vanishing)
    }

    pub fn is_initial(&self, id: StateId) -> bool {
        id.is_initial() && id.index() < self.len()
    }

    /// States without outgoing edges.
    pub fn dead_states(&self) -> Vec<StateId> {
        self.records
            .iter()
            .filter(|record| record.is_empty())
            .map(|record| record.state)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TokenCount;

    fn state(counts: &[u64]) -> ClassifiedState {
        ClassifiedState::tangible(Marking::from_counts(
            1,
            counts.iter().map(|c| TokenCount::Finite(*c)).collect(),
        ))
    }

    fn names() -> (Vec<String>, Vec<String>) {
        (
            vec!["P0".to_string(), "P1".to_string()],
            vec!["Default".to_string()],
        )
    }

    #[test]
    fn assembles_out_of_order_parts() {
        let (places, tokens) = names();
        let mut record = Record::new(StateId::new(0));
        record.add(StateId::new(1), 1.0, ["T".to_string()]);
        let store = StateSpaceStore::from_parts(
            places,
            tokens,
            vec![
                (StateId::new(1), state(&[0, 1])),
                (StateId::new(0), state(&[1, 0])),
            ],
            vec![record],
        )
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.id_of(&state(&[0, 1]).marking), Some(StateId::new(1)));
        assert!(store.is_initial(StateId::new(0)));
        assert!(!store.is_initial(StateId::new(1)));
        assert!(store.is_tangible(StateId::new(1)));
        assert!(!store.is_vanishing(StateId::new(1)));
        assert_eq!(store.dead_states(), vec![StateId::new(1)]);
    }

    #[test]
    fn rejects_gaps_and_dangling_successors() {
        let (places, tokens) = names();
        let gap = StateSpaceStore::from_parts(
            places.clone(),
            tokens.clone(),
            vec![(StateId::new(1), state(&[0, 1]))],
            vec![],
        );
        assert!(matches!(gap, Err(StoreError::NonDenseIds { .. })));

        let mut record = Record::new(StateId::new(0));
        record.add(StateId::new(5), 1.0, ["T".to_string()]);
        let dangling = StateSpaceStore::from_parts(
            places,
            tokens,
            vec![(StateId::new(0), state(&[1, 0]))],
            vec![record],
        );
        assert!(matches!(
            dangling,
            Err(StoreError::UnknownSuccessor { .. })
        ));
    }
}
