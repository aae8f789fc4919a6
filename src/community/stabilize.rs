// Stabilization (spec.md S4.C): produce a deterministic view of the graph so
// clustering observes the same input for the same logical graph regardless of
// insertion history (S8 P6).

use crate::graph::{EdgeData, GraphView, NodeData};
use crate::types::NodeUid;
use petgraph::graph::UnGraph;
use petgraph::visit::Bfs;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A canonically ordered (source, target) pair: for the undirected clustering
/// view, `source <= target` always (spec.md S4.C step 3, S9 Open Question b —
/// directed adjacency is kept in storage, undirected for clustering).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StabilizedEdge {
    pub source: NodeUid,
    pub target: NodeUid,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct StabilizedView {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<StabilizedEdge>,
}

/// Largest connected component, computed over an undirected `petgraph` view
/// of the store's nodes/edges (S9 Open Question b: storage stays directional,
/// clustering treats the graph as undirected).
fn largest_connected_component(nodes: &[NodeData], edges: &[EdgeData]) -> HashSet<NodeUid> {
    let mut graph = UnGraph::<NodeUid, ()>::with_capacity(nodes.len(), edges.len());
    let mut index_of = HashMap::with_capacity(nodes.len());
    for node in nodes {
        index_of.insert(&node.node_uid, graph.add_node(node.node_uid.clone()));
    }
    for edge in edges {
        if let (Some(&s), Some(&t)) = (index_of.get(&edge.source_uid), index_of.get(&edge.target_uid)) {
            graph.update_edge(s, t, ());
        }
    }

    let mut visited = HashSet::new();
    let mut largest: HashSet<NodeUid> = HashSet::new();

    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut component = HashSet::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(current) = bfs.next(&graph) {
            if visited.insert(current) {
                component.insert(graph[current].clone());
            }
        }
        if component.len() > largest.len() {
            largest = component;
        }
    }
    largest
}

/// Run the stabilization procedure of spec.md S4.C over a raw graph snapshot.
pub fn stabilize(view: &GraphView) -> StabilizedView {
    let component = largest_connected_component(&view.nodes, &view.edges);

    let mut nodes: Vec<NodeData> =
        view.nodes.iter().filter(|n| component.contains(&n.node_uid)).cloned().collect();
    nodes.sort_by(|a, b| a.node_uid.cmp(&b.node_uid));

    // Canonically order each endpoint pair (source <= target), then dedup
    // reciprocal edges (an undirected pair stored as both A_to_B and B_to_A)
    // by merging their descriptions before the final lexicographic sort.
    let mut canonical: BTreeMap<(NodeUid, NodeUid), String> = BTreeMap::new();
    for edge in &view.edges {
        if !component.contains(&edge.source_uid) || !component.contains(&edge.target_uid) {
            continue;
        }
        let (source, target) = if edge.source_uid <= edge.target_uid {
            (edge.source_uid.clone(), edge.target_uid.clone())
        } else {
            (edge.target_uid.clone(), edge.source_uid.clone())
        };
        let entry = canonical.entry((source, target)).or_default();
        *entry = crate::graph::merge_description(entry, &edge.description);
    }

    let mut edges: Vec<StabilizedEdge> = canonical
        .into_iter()
        .map(|((source, target), description)| StabilizedEdge { source, target, description })
        .collect();
    edges.sort_by(|a, b| format!("{} -> {}", a.source, a.target).cmp(&format!("{} -> {}", b.source, b.target)));

    StabilizedView { nodes, edges }
}
