// Community Engine (spec.md S4.C): stabilization, hierarchical Leiden
// clustering, and Completion-backed summarization, wired into one pipeline
// that a caller runs against a `GraphStore`.

pub mod leiden;
pub mod stabilize;
pub mod summarizer;

pub use leiden::{cluster, community_uids_for_level, ClusterLevel, HierarchicalClustering, LeidenConfig};
pub use stabilize::{stabilize, StabilizedEdge, StabilizedView};
pub use summarizer::summarize_community;

use crate::contracts::Completion;
use crate::errors::Result;
use crate::graph::{EdgeData, GraphStore, NodeData};
use crate::observability::{log_operation, Operation, OperationContext};
use crate::types::NodeUid;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone, Copy)]
pub struct CommunityEngineStats {
    pub levels: usize,
    pub communities_written: usize,
    pub degraded_communities: usize,
}

/// Run the full Community Engine pipeline: stabilize the store's current
/// graph, cluster it hierarchically, summarize every cluster at every level,
/// and persist the resulting `CommunityData` records back to the store.
pub async fn run_community_engine(
    store: &dyn GraphStore,
    completion: &dyn Completion,
    config: &LeidenConfig,
) -> Result<CommunityEngineStats> {
    let ctx = OperationContext::new("community.run_engine");
    let view = store.build_graph_view().await?;
    let stabilized = stabilize(&view);
    log_operation(
        &ctx,
        &Operation::Stabilize { node_count: stabilized.nodes.len(), edge_count: stabilized.edges.len() },
        &Ok(()),
    );

    let clustering = cluster(&stabilized, config);
    let nodes_by_uid: HashMap<&NodeUid, &NodeData> = stabilized.nodes.iter().map(|n| (&n.node_uid, n)).collect();

    let mut stats = CommunityEngineStats { levels: clustering.levels.len(), ..Default::default() };

    for (level_index, level) in clustering.levels.iter().enumerate() {
        let communities = community_uids_for_level(level_index, level);
        log_operation(
            &ctx,
            &Operation::LeidenCluster { level: level_index, community_count: communities.len() },
            &Ok(()),
        );

        for (community_uid, member_uids) in communities {
            let members: Vec<NodeData> =
                member_uids.iter().filter_map(|uid| nodes_by_uid.get(uid).map(|n| (*n).clone())).collect();
            let incident_edges = incident_edges_for(&stabilized.edges, &member_uids);

            let community = summarize_community(completion, community_uid, &members, &incident_edges).await?;
            if community.summary.is_empty() && community.rating == 0 && community.findings.is_empty() {
                stats.degraded_communities += 1;
            }
            store.store_community(community).await?;
            stats.communities_written += 1;
        }
    }

    Ok(stats)
}

fn incident_edges_for(edges: &[StabilizedEdge], members: &BTreeSet<NodeUid>) -> Vec<EdgeData> {
    edges
        .iter()
        .filter(|e| members.contains(&e.source) || members.contains(&e.target))
        .map(|e| {
            let mut edge = EdgeData::new(e.source.clone(), e.target.clone());
            edge.description = e.description.clone();
            edge
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubCompletion;

    #[async_trait]
    impl Completion for StubCompletion {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _params: crate::contracts::CompletionParams,
        ) -> Result<String> {
            Ok(json!({
                "title": "Test Community",
                "summary": "A test community.",
                "rating": 3,
                "rating_explanation": "Low stakes test fixture.",
                "findings": []
            })
            .to_string())
        }
    }

    #[tokio::test]
    async fn engine_writes_one_community_per_cluster() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(NodeUid::new("Alice").unwrap(), "Alice", "person")).await.unwrap();
        store.add_node(NodeData::new(NodeUid::new("Acme").unwrap(), "Acme", "organization")).await.unwrap();
        store
            .add_edge(EdgeData::new(NodeUid::new("Alice").unwrap(), NodeUid::new("Acme").unwrap()), true)
            .await
            .unwrap();

        let stats = run_community_engine(&store, &StubCompletion, &LeidenConfig::default()).await.unwrap();
        assert!(stats.communities_written > 0);
        assert_eq!(stats.degraded_communities, 0);

        let communities = store.list_communities().await.unwrap();
        assert_eq!(communities.len(), stats.communities_written);
    }
}
