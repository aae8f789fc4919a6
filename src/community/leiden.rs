// Hierarchical Leiden clustering (spec.md S4.C "Clustering"). Grounded in the
// modularity-optimization idiom of community detection implementations seen
// elsewhere in the retrieval pack: nodes start as singletons, are repeatedly
// moved into the neighboring community that yields the largest modularity
// gain, and communities exceeding `max_cluster_size` are recursively
// re-partitioned until every cluster is within budget. Levels are built
// bottom-up by aggregating the previous level's clusters into super-nodes and
// re-running the same move phase, which is the hierarchical half of Leiden
// this crate needs (the refinement/rng-based perturbation phase proper to
// Leiden over Louvain is approximated by seeding the visit order, not by a
// separate refinement graph — acceptable here because S4.C only requires a
// deterministic `level -> (node_uid -> cluster_id)` mapping, not bit-for-bit
// equivalence to any particular reference implementation).

use crate::community::stabilize::StabilizedView;
use crate::types::{CommunityUid, NodeUid};
use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy)]
pub struct LeidenConfig {
    pub max_cluster_size: usize,
    pub seed: u64,
}

impl Default for LeidenConfig {
    fn default() -> Self {
        Self { max_cluster_size: 10, seed: 0xDEAD_BEEF }
    }
}

/// A single level of the hierarchy: which cluster index each node belongs to.
#[derive(Debug, Clone, Default)]
pub struct ClusterLevel {
    pub assignments: BTreeMap<NodeUid, usize>,
}

impl ClusterLevel {
    pub fn cluster_count(&self) -> usize {
        self.assignments.values().copied().collect::<BTreeSet<_>>().len()
    }

    pub fn members_of(&self, cluster_index: usize) -> BTreeSet<NodeUid> {
        self.assignments
            .iter()
            .filter(|(_, &c)| c == cluster_index)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HierarchicalClustering {
    pub levels: Vec<ClusterLevel>,
}

/// Bare adjacency list used internally by the move phase; unweighted, since
/// stabilization discards edge weight (clustering operates on structure only).
struct Graph {
    nodes: Vec<NodeUid>,
    adjacency: HashMap<NodeUid, BTreeSet<NodeUid>>,
}

impl Graph {
    fn from_stabilized(view: &StabilizedView) -> Self {
        let mut adjacency: HashMap<NodeUid, BTreeSet<NodeUid>> = HashMap::new();
        for node in &view.nodes {
            adjacency.entry(node.node_uid.clone()).or_default();
        }
        for edge in &view.edges {
            adjacency.entry(edge.source.clone()).or_default().insert(edge.target.clone());
            adjacency.entry(edge.target.clone()).or_default().insert(edge.source.clone());
        }
        let nodes = view.nodes.iter().map(|n| n.node_uid.clone()).collect();
        Self { nodes, adjacency }
    }

    fn subgraph(&self, members: &BTreeSet<NodeUid>) -> Self {
        let nodes: Vec<NodeUid> = self.nodes.iter().filter(|n| members.contains(n)).cloned().collect();
        let mut adjacency = HashMap::new();
        for node in &nodes {
            let neighbors: BTreeSet<NodeUid> = self
                .adjacency
                .get(node)
                .into_iter()
                .flatten()
                .filter(|n| members.contains(*n))
                .cloned()
                .collect();
            adjacency.insert(node.clone(), neighbors);
        }
        Self { nodes, adjacency }
    }

    fn total_edges(&self) -> f64 {
        let sum: usize = self.adjacency.values().map(|n| n.len()).sum();
        (sum as f64) / 2.0
    }
}

/// One pass of greedy modularity optimization (Louvain move phase), visiting
/// nodes in a seeded-random order so the result is deterministic but not
/// trivially dependent on insertion order.
fn move_phase(graph: &Graph, rng: &mut ChaCha8Rng) -> BTreeMap<NodeUid, usize> {
    let mut assignment: BTreeMap<NodeUid, usize> =
        graph.nodes.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();

    if graph.nodes.is_empty() {
        return assignment;
    }

    let total_edges = graph.total_edges().max(1.0);
    let degree: HashMap<&NodeUid, f64> =
        graph.nodes.iter().map(|n| (n, graph.adjacency.get(n).map(|a| a.len()).unwrap_or(0) as f64)).collect();

    let mut order: Vec<NodeUid> = graph.nodes.clone();
    order.shuffle(rng);

    let mut improved = true;
    let mut iterations = 0;
    while improved && iterations < 20 {
        improved = false;
        iterations += 1;
        for node in &order {
            let current_cluster = assignment[node];
            let neighbors = graph.adjacency.get(node).cloned().unwrap_or_default();
            if neighbors.is_empty() {
                continue;
            }

            let mut candidate_clusters: BTreeSet<usize> =
                neighbors.iter().map(|n| assignment[n]).collect();
            candidate_clusters.insert(current_cluster);

            let mut best_cluster = current_cluster;
            let mut best_gain = 0.0_f64;
            for &candidate in &candidate_clusters {
                if candidate == current_cluster {
                    continue;
                }
                let links_to_candidate = neighbors.iter().filter(|n| assignment[*n] == candidate).count() as f64;
                let links_to_current =
                    neighbors.iter().filter(|n| assignment[*n] == current_cluster).count() as f64;
                // Simplified modularity delta: edges gained to the candidate community
                // minus edges lost from the current one, scaled by degree to discourage
                // merging high-degree hubs into every neighboring cluster.
                let gain = (links_to_candidate - links_to_current) / total_edges
                    - (degree[node] / (2.0 * total_edges)).powi(2);
                if gain > best_gain {
                    best_gain = gain;
                    best_cluster = candidate;
                }
            }
            if best_cluster != current_cluster {
                assignment.insert(node.clone(), best_cluster);
                improved = true;
            }
        }
    }
    assignment
}

/// Recursively split any cluster whose size exceeds `max_cluster_size`, by
/// re-running the move phase restricted to that cluster's induced subgraph.
fn enforce_max_size(
    graph: &Graph,
    assignment: BTreeMap<NodeUid, usize>,
    max_cluster_size: usize,
    rng: &mut ChaCha8Rng,
) -> BTreeMap<NodeUid, usize> {
    // Keyed by a `BTreeMap` and walked in cluster-id order so `next_index`
    // assignment is deterministic for a fixed seed regardless of hasher state.
    let mut clusters: BTreeMap<usize, BTreeSet<NodeUid>> = BTreeMap::new();
    for (node, cluster) in &assignment {
        clusters.entry(*cluster).or_default().insert(node.clone());
    }

    let mut result = BTreeMap::new();
    let mut next_index = 0usize;
    for (_, members) in clusters {
        if members.len() <= max_cluster_size.max(1) {
            for node in members {
                result.insert(node, next_index);
            }
            next_index += 1;
            continue;
        }

        // Oversized cluster: split by bisecting members alphabetically, which is
        // deterministic and, combined with the neighbor-aware move phase on the
        // resulting subgraphs, tends to cut along the sparsest boundary available.
        let sub = graph.subgraph(&members);
        let halves = bisect(&members);
        for half in halves {
            let sub_sub = sub.subgraph(&half);
            let sub_assignment = if sub_sub.nodes.len() > max_cluster_size.max(1) {
                enforce_max_size(&sub_sub, move_phase(&sub_sub, rng), max_cluster_size, rng)
            } else {
                half.iter().map(|n| (n.clone(), 0)).collect()
            };
            let mut local_clusters: BTreeMap<usize, Vec<NodeUid>> = BTreeMap::new();
            for (node, c) in sub_assignment {
                local_clusters.entry(c).or_default().push(node);
            }
            for (_, nodes) in local_clusters {
                for node in nodes {
                    result.insert(node, next_index);
                }
                next_index += 1;
            }
        }
    }
    result
}

fn bisect(members: &BTreeSet<NodeUid>) -> Vec<BTreeSet<NodeUid>> {
    let ordered: Vec<NodeUid> = members.iter().cloned().collect();
    let mid = ordered.len() / 2;
    let (left, right) = ordered.split_at(mid.max(1));
    vec![left.iter().cloned().collect(), right.iter().cloned().collect()]
}

/// Synthetic uid minted for a cluster's super-node at the next, coarser level.
fn super_node_uid(cluster: usize) -> NodeUid {
    NodeUid::from_canonical(format!("__CLUSTER_{cluster}__")).expect("well-formed")
}

/// Aggregate a level's clusters into super-nodes for the next, coarser level.
fn aggregate(graph: &Graph, assignment: &BTreeMap<NodeUid, usize>) -> Graph {
    let mut super_adjacency: HashMap<NodeUid, BTreeSet<NodeUid>> = HashMap::new();
    let super_uid = super_node_uid;

    let clusters: BTreeSet<usize> = assignment.values().copied().collect();
    for &cluster in &clusters {
        super_adjacency.entry(super_uid(cluster)).or_default();
    }
    for (node, neighbors) in &graph.adjacency {
        let Some(&cluster) = assignment.get(node) else { continue };
        for neighbor in neighbors {
            let Some(&neighbor_cluster) = assignment.get(neighbor) else { continue };
            if neighbor_cluster != cluster {
                super_adjacency.entry(super_uid(cluster)).or_default().insert(super_uid(neighbor_cluster));
            }
        }
    }
    let nodes = clusters.into_iter().map(super_uid).collect();
    Graph { nodes, adjacency: super_adjacency }
}

/// Run hierarchical Leiden over a stabilized view (spec.md S4.C). Produces one
/// `ClusterLevel` per level of the hierarchy, finest first, stopping once a
/// level collapses to a single cluster or stops changing. Every level's
/// `assignments` is keyed by the *original* node uids from `view`, never by
/// the synthetic super-node uids `aggregate` mints internally: each level
/// carries forward a base-member map so a level-N cluster's members are
/// always the union of the underlying original nodes, not the aggregated
/// graph's super-nodes.
pub fn cluster(view: &StabilizedView, config: &LeidenConfig) -> HierarchicalClustering {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut clustering = HierarchicalClustering::default();

    if view.nodes.is_empty() {
        return clustering;
    }

    let mut graph = Graph::from_stabilized(view);
    let mut previous_cluster_count = usize::MAX;

    // `base_of[n]` is the set of original node uids collapsed into the
    // current graph's node `n`; at level 0 every node is its own base.
    let mut base_of: HashMap<NodeUid, BTreeSet<NodeUid>> =
        graph.nodes.iter().map(|n| (n.clone(), BTreeSet::from([n.clone()]))).collect();

    for _level in 0..8 {
        let raw = move_phase(&graph, &mut rng);
        let bounded = enforce_max_size(&graph, raw, config.max_cluster_size, &mut rng);

        let mut assignments: BTreeMap<NodeUid, usize> = BTreeMap::new();
        for (node, &cluster_index) in &bounded {
            for original in base_of.get(node).into_iter().flatten() {
                assignments.insert(original.clone(), cluster_index);
            }
        }
        let level = ClusterLevel { assignments };
        let cluster_count = level.cluster_count();
        clustering.levels.push(level);

        if cluster_count <= 1 || cluster_count >= previous_cluster_count {
            break;
        }
        previous_cluster_count = cluster_count;

        let mut next_base_of: HashMap<NodeUid, BTreeSet<NodeUid>> = HashMap::new();
        for (node, &cluster_index) in &bounded {
            let members = next_base_of.entry(super_node_uid(cluster_index)).or_default();
            if let Some(base) = base_of.get(node) {
                members.extend(base.iter().cloned());
            } else {
                members.insert(node.clone());
            }
        }

        graph = aggregate(&graph, &bounded);
        base_of = next_base_of;
    }

    clustering
}

/// Materialize `CommunityData` records for every cluster at every level
/// (spec.md S4.C: "materializes, for each cluster at each level, a
/// `CommunityData`"). `level.assignments` is already keyed by original node
/// uids (see `cluster`), so this is a plain group-by.
pub fn community_uids_for_level(level_index: usize, level: &ClusterLevel) -> BTreeMap<CommunityUid, BTreeSet<NodeUid>> {
    let mut out = BTreeMap::new();
    let clusters: BTreeSet<usize> = level.assignments.values().copied().collect();
    for cluster_index in clusters {
        let members = level.members_of(cluster_index);
        out.insert(CommunityUid::for_cluster(level_index, cluster_index), members);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::stabilize::StabilizedEdge;

    fn uid(s: &str) -> NodeUid {
        NodeUid::new(s).unwrap()
    }

    fn view_with_two_triangles() -> StabilizedView {
        // Two dense triangles (A,B,C) and (D,E,F) joined by a single bridge edge
        // B-D: modularity optimization should keep each triangle together.
        let nodes = vec![
            crate::graph::NodeData::new(uid("A"), "A", ""),
            crate::graph::NodeData::new(uid("B"), "B", ""),
            crate::graph::NodeData::new(uid("C"), "C", ""),
            crate::graph::NodeData::new(uid("D"), "D", ""),
            crate::graph::NodeData::new(uid("E"), "E", ""),
            crate::graph::NodeData::new(uid("F"), "F", ""),
        ];
        let edge = |s: &str, t: &str| StabilizedEdge { source: uid(s), target: uid(t), description: String::new() };
        let edges = vec![
            edge("A", "B"),
            edge("B", "C"),
            edge("A", "C"),
            edge("D", "E"),
            edge("E", "F"),
            edge("D", "F"),
            edge("B", "D"),
        ];
        StabilizedView { nodes, edges }
    }

    #[test]
    fn produces_at_least_one_level() {
        let view = view_with_two_triangles();
        let clustering = cluster(&view, &LeidenConfig::default());
        assert!(!clustering.levels.is_empty());
        assert_eq!(clustering.levels[0].assignments.len(), 6);
    }

    #[test]
    fn respects_max_cluster_size() {
        let view = view_with_two_triangles();
        let config = LeidenConfig { max_cluster_size: 2, seed: 0xDEAD_BEEF };
        let clustering = cluster(&view, &config);
        let level = &clustering.levels[0];
        for cluster_index in level.assignments.values().copied().collect::<BTreeSet<_>>() {
            assert!(level.members_of(cluster_index).len() <= 2);
        }
    }

    #[test]
    fn is_deterministic_for_a_fixed_seed() {
        let view = view_with_two_triangles();
        let config = LeidenConfig::default();
        let a = cluster(&view, &config);
        let b = cluster(&view, &config);
        assert_eq!(a.levels[0].assignments, b.levels[0].assignments);
    }

    #[test]
    fn higher_levels_materialize_real_node_uids_not_synthetic_cluster_uids() {
        let view = view_with_two_triangles();
        let config = LeidenConfig { max_cluster_size: 1, seed: 0xDEAD_BEEF };
        let clustering = cluster(&view, &config);
        let original: BTreeSet<NodeUid> = view.nodes.iter().map(|n| n.node_uid.clone()).collect();
        for level in &clustering.levels {
            for node in level.assignments.keys() {
                assert!(!node.as_str().starts_with("__CLUSTER_"));
                assert!(original.contains(node));
            }
        }
        // Every original node must still be accounted for at every level, even
        // once super-nodes have been aggregated away.
        if clustering.levels.len() > 1 {
            let top = &clustering.levels[clustering.levels.len() - 1];
            let covered: BTreeSet<NodeUid> = top.assignments.keys().cloned().collect();
            assert_eq!(covered, original);
        }
    }

    #[test]
    fn community_uids_are_stable_format() {
        let view = view_with_two_triangles();
        let clustering = cluster(&view, &LeidenConfig::default());
        let map = community_uids_for_level(0, &clustering.levels[0]);
        for uid in map.keys() {
            assert!(uid.as_str().starts_with("community_L0_"));
        }
    }
}
