//! 覆盖性探索：沿祖先链的 Karp–Miller ω 折叠.
//!
//! 每个被认领的状态记录其首次发现时的父状态。新后继若支配祖先链上
//! (含源状态) 的某个标识，则其严格增长的分量被置为 ω.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::net::ids::StateId;
use crate::state::{Marking, TokenCount};

/// 覆盖树节点: 首次发现时的父状态与标识
#[derive(Debug, Clone)]
struct CoverNode {
    parent: Option<StateId>,
    marking: Marking,
}

/// Parent links of claimed states, shared by all exploration workers.
#[derive(Debug, Default)]
pub struct CoverabilityTree {
    nodes: DashMap<StateId, CoverNode, FxBuildHasher>,
}

impl CoverabilityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` as discovered from `parent`. Later calls for the same
    /// state keep the first parent.
    pub fn discovered(&self, state: StateId, parent: Option<StateId>, marking: &Marking) {
        self.nodes.entry(state).or_insert_with(|| CoverNode {
            parent,
            marking: marking.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Markings from `source` up to the root.
    pub fn ancestors(&self, source: StateId) -> Vec<Marking> {
        let mut chain = Vec::new();
        let mut cursor = Some(source);
        while let Some(id) = cursor {
            // Clone out of the shard before moving on.
            let Some((parent, marking)) = self
                .nodes
                .get(&id)
                .map(|node| (node.parent, node.marking.clone()))
            else {
                break;
            };
            chain.push(marking);
            cursor = parent;
            if chain.len() > self.nodes.len() {
                break;
            }
        }
        chain
    }

    /// Folds every coordinate of `successor` that strictly exceeds a
    /// dominated ancestor of `source` to ω.
    pub fn accelerate(&self, source: StateId, mut successor: Marking) -> Marking {
        for ancestor in self.ancestors(source) {
            if successor.dominates(&ancestor) {
                fold_greater(&mut successor, &ancestor);
            }
        }
        successor
    }
}

fn fold_greater(successor: &mut Marking, ancestor: &Marking) {
    let coordinates = successor.coordinates_mut();
    for (count, before) in coordinates.iter_mut().zip(ancestor.counts()) {
        if *count > *before {
            *count = TokenCount::Omega;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marking(counts: &[u64]) -> Marking {
        Marking::from_counts(1, counts.iter().map(|c| TokenCount::from_raw(*c)).collect())
    }

    #[test]
    fn dominating_successor_gets_omega() {
        let tree = CoverabilityTree::new();
        tree.discovered(StateId::new(0), None, &marking(&[1, 0]));
        tree.discovered(StateId::new(1), Some(StateId::new(0)), &marking(&[0, 1]));

        let folded = tree.accelerate(StateId::new(1), marking(&[0, 2]));
        assert_eq!(folded, marking(&[0, u64::MAX]));

        let unrelated = tree.accelerate(StateId::new(1), marking(&[2, 0]));
        assert_eq!(unrelated, marking(&[u64::MAX, 0]));
    }

    #[test]
    fn first_parent_wins() {
        let tree = CoverabilityTree::new();
        tree.discovered(StateId::new(0), None, &marking(&[3]));
        tree.discovered(StateId::new(1), Some(StateId::new(0)), &marking(&[1]));
        tree.discovered(StateId::new(1), None, &marking(&[1]));
        assert_eq!(tree.ancestors(StateId::new(1)).len(), 2);
        assert_eq!(tree.len(), 2);
    }
}
