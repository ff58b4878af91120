//! 状态空间到 petgraph / Graphviz 的导出，供渲染器使用.
use std::fs;
use std::path::Path;

use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::{EdgeReference, StableGraph};
use rustc_hash::FxHashMap;

use crate::net::ids::StateId;
use crate::net::index_vec::Idx;
use crate::state::Classification;
use crate::store::StateSpaceStore;

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    /// Only states with a smaller id are drawn.
    pub max_states: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { max_states: 100 }
    }
}

#[derive(Debug, Clone)]
pub struct StateView {
    pub id: StateId,
    /// `[id] (c1,c2,...)`
    pub label: String,
    pub classification: Classification,
    pub initial: bool,
}

#[derive(Debug, Clone)]
pub struct EdgeView {
    pub rate: f64,
    /// `T1, T2 (0.50)`
    pub label: String,
}

impl StateSpaceStore {
    pub fn to_graph(&self, options: GraphOptions) -> StableGraph<StateView, EdgeView> {
        let mut graph = StableGraph::new();
        let mut nodes: FxHashMap<StateId, NodeIndex> = FxHashMap::default();

        for (id, state) in self.states().take(options.max_states) {
            let index = graph.add_node(StateView {
                id,
                label: format!("[{}] {}", id.raw(), state.marking),
                classification: state.classification,
                initial: self.is_initial(id),
            });
            nodes.insert(id, index);
        }

        for record in self.records().take(options.max_states) {
            let Some(&source) = nodes.get(&record.state) else {
                continue;
            };
            for (target, successor) in record.successors() {
                let Some(&target) = nodes.get(&target) else {
                    continue;
                };
                graph.add_edge(
                    source,
                    target,
                    EdgeView {
                        rate: successor.rate,
                        label: format!("{} ({:.2})", successor.label(), successor.rate),
                    },
                );
            }
        }

        if self.len() > options.max_states {
            log::warn!(
                "graph export truncated to {} of {} states",
                options.max_states,
                self.len()
            );
        }
        graph
    }

    pub fn to_dot(&self, options: GraphOptions) -> String {
        fn escape(s: &str) -> String {
            s.replace('\\', "\\\\").replace('"', "\\\"")
        }

        let graph = self.to_graph(options);

        let mut edge_attr = |_, edge: EdgeReference<EdgeView>| -> String {
            format!("label=\"{}\"", escape(&edge.weight().label))
        };

        let mut node_attr = |_, (_idx, node): (NodeIndex, &StateView)| -> String {
            let style = match (node.initial, node.classification) {
                (true, _) => "shape=doublecircle",
                (false, Classification::Tangible) => "shape=ellipse",
                (false, Classification::Vanishing) => "shape=ellipse, style=dashed",
            };
            format!("label=\"{}\", {}", escape(&node.label), style)
        };

        format!(
            "{:?}",
            Dot::with_attr_getters(
                &graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &mut edge_attr,
                &mut node_attr
            )
        )
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P, options: GraphOptions) -> std::io::Result<()> {
        let dot = self.to_dot(options);
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, dot)
    }

    /// Graph node of `id` in a graph built by [`Self::to_graph`].
    pub fn node_index(id: StateId) -> NodeIndex {
        NodeIndex::new(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClassifiedState, Marking, TokenCount};
    use crate::store::Record;

    fn store() -> StateSpaceStore {
        let mut record = Record::new(StateId::new(0));
        record.add(StateId::new(1), 0.5, ["T2".to_string(), "T1".to_string()]);
        StateSpaceStore::from_parts(
            vec!["P0".into(), "P1".into()],
            vec!["Default".into()],
            vec![
                (
                    StateId::new(0),
                    ClassifiedState::tangible(Marking::from_counts(1, vec![1.into(), 0.into()])),
                ),
                (
                    StateId::new(1),
                    ClassifiedState::tangible(Marking::from_counts(
                        1,
                        vec![0.into(), TokenCount::Omega],
                    )),
                ),
            ],
            vec![record],
        )
        .unwrap()
    }

    #[test]
    fn labels_follow_renderer_format() {
        let graph = store().to_graph(GraphOptions::default());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph[StateSpaceStore::node_index(StateId::new(0))].label, "[0] (1,0)");
        assert_eq!(graph[StateSpaceStore::node_index(StateId::new(1))].label, "[1] (0,ω)");
        let edge = graph.edge_weights().next().unwrap();
        assert_eq!(edge.label, "T1, T2 (0.50)");

        let dot = store().to_dot(GraphOptions::default());
        assert!(dot.contains("ω"));
        assert!(dot.contains("doublecircle"));
    }

    #[test]
    fn ceiling_drops_states_and_their_edges() {
        let graph = store().to_graph(GraphOptions { max_states: 1 });
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }
}
