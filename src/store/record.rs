use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::ids::StateId;

/// Outgoing edge of a record: aggregated rate and the transitions behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Successor {
    pub rate: f64,
    pub labels: BTreeSet<String>,
}

impl Successor {
    pub fn new(rate: f64, labels: BTreeSet<String>) -> Self {
        Self { rate, labels }
    }

    /// Parallel paths to the same target: rates add, labels union.
    pub fn merge(&mut self, rate: f64, labels: impl IntoIterator<Item = String>) {
        self.rate += rate;
        self.labels.extend(labels);
    }

    /// Labels joined in sorted order, e.g. `T1, T2`.
    pub fn label(&self) -> String {
        itertools::join(self.labels.iter(), ", ")
    }
}

/// Successor distribution of one explored state.
///
/// Successors keep the order in which they were first contributed. An empty
/// record marks a dead state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub state: StateId,
    successors: IndexMap<StateId, Successor>,
}

impl Record {
    pub fn new(state: StateId) -> Self {
        Self {
            state,
            successors: IndexMap::new(),
        }
    }

    pub fn add(&mut self, target: StateId, rate: f64, labels: impl IntoIterator<Item = String>) {
        self.successors
            .entry(target)
            .or_insert_with(|| Successor::new(0.0, BTreeSet::new()))
            .merge(rate, labels);
    }

    pub fn get(&self, target: StateId) -> Option<&Successor> {
        self.successors.get(&target)
    }

    pub fn successors(&self) -> impl Iterator<Item = (StateId, &Successor)> + '_ {
        self.successors.iter().map(|(id, successor)| (*id, successor))
    }

    pub fn targets(&self) -> impl Iterator<Item = StateId> + '_ {
        self.successors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Sum of outgoing rates (the exit rate of a tangible state).
    pub fn total_rate(&self) -> f64 {
        self.successors.values().map(|successor| successor.rate).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_contributions_merge() {
        let mut record = Record::new(StateId::new(0));
        record.add(StateId::new(1), 0.5, ["T2".to_string()]);
        record.add(StateId::new(2), 1.0, ["T3".to_string()]);
        record.add(StateId::new(1), 0.25, ["T1".to_string()]);

        assert_eq!(record.len(), 2);
        let merged = record.get(StateId::new(1)).unwrap();
        assert_eq!(merged.rate, 0.75);
        assert_eq!(merged.label(), "T1, T2");
        assert_eq!(record.total_rate(), 1.75);
        assert_eq!(
            record.targets().collect::<Vec<_>>(),
            vec![StateId::new(1), StateId::new(2)]
        );
    }
}
