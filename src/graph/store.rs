// Graph Store (spec.md S4.A): a document-oriented persistence layer with three
// collections (nodes, edges, communities) and the I1/I2 adjacency invariants.
//
// Mirrors the in-memory half of the retained `native_graph_storage.rs` lineage —
// concurrent maps rather than a custom page format, since these documents are
// whole JSON values rather than fixed-size records — with optional snapshot
// persistence to a directory of newline-delimited JSON files on `flush()`.

use crate::errors::{GraphRagError, Result};
use crate::graph::model::{CommunityData, EdgeData, NodeData};
use crate::observability::{log_operation, Operation, OperationContext};
use crate::types::{CommunityUid, EdgeUid, NodeUid};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// An unordered snapshot of the whole graph, handed to the Community Engine's
/// stabilization step (spec.md S4.C). Ordering guarantees are the stabilizer's job,
/// not the store's.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<EdgeData>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn add_node(&self, data: NodeData) -> Result<()>;
    async fn get_node(&self, uid: &NodeUid) -> Result<NodeData>;
    async fn update_node(&self, data: NodeData) -> Result<()>;
    async fn remove_node(&self, uid: &NodeUid) -> Result<()>;

    async fn add_edge(&self, edge: EdgeData, directed: bool) -> Result<()>;
    async fn get_edge(&self, source: &NodeUid, target: &NodeUid) -> Result<EdgeData>;
    async fn update_edge(&self, edge: EdgeData) -> Result<()>;
    async fn remove_edge(&self, source: &NodeUid, target: &NodeUid, directed: bool) -> Result<()>;

    async fn build_graph_view(&self) -> Result<GraphView>;

    async fn list_communities(&self) -> Result<Vec<CommunityData>>;
    async fn store_community(&self, community: CommunityData) -> Result<()>;
    async fn get_community(&self, uid: &CommunityUid) -> Result<CommunityData>;

    /// Rebuild `edges_to`/`edges_from` on every node from the edge collection,
    /// for recovery after a crash between the two-write sequence in `add_edge`.
    /// Returns the number of nodes whose adjacency sets were touched.
    async fn repair_adjacency(&self) -> Result<usize>;
}

/// The concrete, production `GraphStore`. `nodes` and `edges` are separate maps;
/// `store_edge`/`store_node` never update both atomically — that is the
/// denormalization-with-an-invariant tradeoff spec.md S9 calls out.
pub struct InMemoryGraphStore {
    nodes: DashMap<NodeUid, NodeData>,
    edges: DashMap<EdgeUid, EdgeData>,
    communities: DashMap<CommunityUid, CommunityData>,
    snapshot_dir: Option<PathBuf>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            communities: DashMap::new(),
            snapshot_dir: None,
        }
    }

    /// Open a store backed by a directory of JSON snapshot files, loading any
    /// existing `nodes.json`/`edges.json`/`communities.json` found there.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GraphRagError::TransientUpstream(e.to_string()))?;

        let store = Self { snapshot_dir: Some(dir.clone()), ..Self::new() };
        store.load_snapshot(&dir).await?;
        Ok(store)
    }

    async fn load_snapshot(&self, dir: &Path) -> Result<()> {
        if let Ok(bytes) = tokio::fs::read(dir.join("nodes.json")).await {
            let nodes: Vec<NodeData> =
                serde_json::from_slice(&bytes).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;
            for node in nodes {
                self.nodes.insert(node.node_uid.clone(), node);
            }
        }
        if let Ok(bytes) = tokio::fs::read(dir.join("edges.json")).await {
            let edges: Vec<EdgeData> =
                serde_json::from_slice(&bytes).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;
            for edge in edges {
                self.edges.insert(edge.edge_uid.clone(), edge);
            }
        }
        if let Ok(bytes) = tokio::fs::read(dir.join("communities.json")).await {
            let communities: Vec<CommunityData> =
                serde_json::from_slice(&bytes).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;
            for community in communities {
                self.communities.insert(community.community_uid.clone(), community);
            }
        }
        Ok(())
    }

    /// Persist the current state to the snapshot directory, if one is configured.
    pub async fn flush(&self) -> Result<()> {
        let Some(dir) = &self.snapshot_dir else { return Ok(()) };
        self.write_snapshot(dir, "nodes.json", &self.nodes.iter().map(|e| e.value().clone()).collect::<Vec<_>>())
            .await?;
        self.write_snapshot(dir, "edges.json", &self.edges.iter().map(|e| e.value().clone()).collect::<Vec<_>>())
            .await?;
        self.write_snapshot(
            dir,
            "communities.json",
            &self.communities.iter().map(|e| e.value().clone()).collect::<Vec<_>>(),
        )
        .await
    }

    async fn write_snapshot<T: serde::Serialize>(&self, dir: &Path, file: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| GraphRagError::Other(e.into()))?;
        let mut f = tokio::fs::File::create(dir.join(file))
            .await
            .map_err(|e| GraphRagError::TransientUpstream(e.to_string()))?;
        f.write_all(&bytes).await.map_err(|e| GraphRagError::TransientUpstream(e.to_string()))?;
        Ok(())
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_node(&self, data: NodeData) -> Result<()> {
        let ctx = OperationContext::new("graph_store.add_node");
        if self.nodes.contains_key(&data.node_uid) {
            return Err(GraphRagError::already_exists(format!("node {}", data.node_uid)));
        }
        let uid = data.node_uid.clone();
        let edges_to = data.edges_to.clone();
        let edges_from = data.edges_from.clone();
        self.nodes.insert(uid.clone(), data);

        // Best-effort: extend each neighbor's symmetric adjacency set (I1). A
        // neighbor that doesn't exist yet is tolerated — adjacency is denormalized
        // on purpose (S9); `repair_adjacency` is the recovery path.
        for neighbor in &edges_to {
            if let Some(mut n) = self.nodes.get_mut(neighbor) {
                n.edges_from.insert(uid.clone());
            }
        }
        for neighbor in &edges_from {
            if let Some(mut n) = self.nodes.get_mut(neighbor) {
                n.edges_to.insert(uid.clone());
            }
        }
        log_operation(&ctx, &Operation::GraphNodeWrite { node_uid: uid.to_string() }, &Ok(()));
        Ok(())
    }

    async fn get_node(&self, uid: &NodeUid) -> Result<NodeData> {
        self.nodes
            .get(uid)
            .map(|n| n.value().clone())
            .ok_or_else(|| GraphRagError::not_found(format!("node {uid}")))
    }

    async fn update_node(&self, data: NodeData) -> Result<()> {
        if !self.nodes.contains_key(&data.node_uid) {
            return Err(GraphRagError::not_found(format!("node {}", data.node_uid)));
        }
        self.nodes.insert(data.node_uid.clone(), data);
        Ok(())
    }

    async fn remove_node(&self, uid: &NodeUid) -> Result<()> {
        let Some((_, removed)) = self.nodes.remove(uid) else {
            return Err(GraphRagError::not_found(format!("node {uid}")));
        };
        for neighbor in removed.edges_to.iter().chain(removed.edges_from.iter()) {
            if let Some(mut n) = self.nodes.get_mut(neighbor) {
                n.edges_to.remove(uid);
                n.edges_from.remove(uid);
            }
        }
        Ok(())
    }

    async fn add_edge(&self, edge: EdgeData, directed: bool) -> Result<()> {
        if !self.nodes.contains_key(&edge.source_uid) {
            return Err(GraphRagError::not_found(format!("node {}", edge.source_uid)));
        }
        if !self.nodes.contains_key(&edge.target_uid) {
            return Err(GraphRagError::not_found(format!("node {}", edge.target_uid)));
        }

        let (source, target) = (edge.source_uid.clone(), edge.target_uid.clone());
        self.edges.insert(edge.edge_uid.clone(), edge.clone());
        if let Some(mut n) = self.nodes.get_mut(&source) {
            n.edges_to.insert(target.clone());
        }
        if let Some(mut n) = self.nodes.get_mut(&target) {
            n.edges_from.insert(source.clone());
        }

        if !directed {
            let mut reverse = EdgeData::new(target.clone(), source.clone());
            reverse.description = edge.description.clone();
            reverse.document_id = edge.document_id.clone();
            reverse.weight = edge.weight;
            self.edges.insert(reverse.edge_uid.clone(), reverse);
            if let Some(mut n) = self.nodes.get_mut(&target) {
                n.edges_to.insert(source.clone());
            }
            if let Some(mut n) = self.nodes.get_mut(&source) {
                n.edges_from.insert(target.clone());
            }
        }
        Ok(())
    }

    async fn get_edge(&self, source: &NodeUid, target: &NodeUid) -> Result<EdgeData> {
        let uid = EdgeUid::derive(source, target);
        self.edges.get(&uid).map(|e| e.value().clone()).ok_or_else(|| GraphRagError::not_found(format!("edge {uid}")))
    }

    async fn update_edge(&self, edge: EdgeData) -> Result<()> {
        if !self.edges.contains_key(&edge.edge_uid) {
            return Err(GraphRagError::not_found(format!("edge {}", edge.edge_uid)));
        }
        self.edges.insert(edge.edge_uid.clone(), edge);
        Ok(())
    }

    async fn remove_edge(&self, source: &NodeUid, target: &NodeUid, directed: bool) -> Result<()> {
        let uid = EdgeUid::derive(source, target);
        if self.edges.remove(&uid).is_none() {
            return Err(GraphRagError::not_found(format!("edge {uid}")));
        }
        if let Some(mut n) = self.nodes.get_mut(source) {
            n.edges_to.remove(target);
        }
        if let Some(mut n) = self.nodes.get_mut(target) {
            n.edges_from.remove(source);
        }
        if !directed {
            let reverse_uid = EdgeUid::derive(target, source);
            self.edges.remove(&reverse_uid);
            if let Some(mut n) = self.nodes.get_mut(target) {
                n.edges_to.remove(source);
            }
            if let Some(mut n) = self.nodes.get_mut(source) {
                n.edges_from.remove(target);
            }
        }
        Ok(())
    }

    async fn build_graph_view(&self) -> Result<GraphView> {
        Ok(GraphView {
            nodes: self.nodes.iter().map(|e| e.value().clone()).collect(),
            edges: self.edges.iter().map(|e| e.value().clone()).collect(),
        })
    }

    async fn list_communities(&self) -> Result<Vec<CommunityData>> {
        Ok(self.communities.iter().map(|e| e.value().clone()).collect())
    }

    async fn store_community(&self, community: CommunityData) -> Result<()> {
        self.communities.insert(community.community_uid.clone(), community);
        Ok(())
    }

    async fn get_community(&self, uid: &CommunityUid) -> Result<CommunityData> {
        self.communities
            .get(uid)
            .map(|c| c.value().clone())
            .ok_or_else(|| GraphRagError::not_found(format!("community {uid}")))
    }

    async fn repair_adjacency(&self) -> Result<usize> {
        for mut node in self.nodes.iter_mut() {
            node.edges_to.clear();
            node.edges_from.clear();
        }
        let mut touched = std::collections::HashSet::new();
        for edge in self.edges.iter() {
            let edge = edge.value();
            if let Some(mut n) = self.nodes.get_mut(&edge.source_uid) {
                n.edges_to.insert(edge.target_uid.clone());
                touched.insert(edge.source_uid.clone());
            }
            if let Some(mut n) = self.nodes.get_mut(&edge.target_uid) {
                n.edges_from.insert(edge.source_uid.clone());
                touched.insert(edge.target_uid.clone());
            }
        }
        Ok(touched.len())
    }
}

pub type SharedGraphStore = Arc<dyn GraphStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> NodeUid {
        NodeUid::new(s).unwrap()
    }

    #[tokio::test]
    async fn add_node_extends_neighbor_adjacency_best_effort() {
        let store = InMemoryGraphStore::new();
        let mut alice = NodeData::new(uid("Alice"), "Alice", "person");
        alice.edges_to.insert(uid("Acme"));
        // Acme doesn't exist yet — tolerated.
        store.add_node(alice).await.unwrap();
        let acme = NodeData::new(uid("Acme"), "Acme", "organization");
        store.add_node(acme).await.unwrap();

        let edge = EdgeData::new(uid("Alice"), uid("Acme"));
        store.add_edge(edge, true).await.unwrap();

        let alice = store.get_node(&uid("Alice")).await.unwrap();
        let acme = store.get_node(&uid("Acme")).await.unwrap();
        assert!(alice.edges_to.contains(&uid("Acme")));
        assert!(acme.edges_from.contains(&uid("Alice")));
    }

    #[tokio::test]
    async fn add_node_twice_fails_already_exists() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        let err = store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap_err();
        assert!(matches!(err, GraphRagError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn add_edge_requires_both_endpoints() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        let err = store.add_edge(EdgeData::new(uid("Alice"), uid("Acme")), true).await.unwrap_err();
        assert!(matches!(err, GraphRagError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_node_repairs_neighbor_adjacency() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        store.add_node(NodeData::new(uid("Acme"), "Acme", "organization")).await.unwrap();
        store.add_edge(EdgeData::new(uid("Alice"), uid("Acme")), true).await.unwrap();

        store.remove_node(&uid("Alice")).await.unwrap();
        let acme = store.get_node(&uid("Acme")).await.unwrap();
        assert!(!acme.edges_from.contains(&uid("Alice")));
    }

    #[tokio::test]
    async fn undirected_edge_adds_reverse() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        store.add_node(NodeData::new(uid("Acme"), "Acme", "organization")).await.unwrap();
        store.add_edge(EdgeData::new(uid("Alice"), uid("Acme")), false).await.unwrap();

        assert!(store.get_edge(&uid("Acme"), &uid("Alice")).await.is_ok());
        let acme = store.get_node(&uid("Acme")).await.unwrap();
        assert!(acme.edges_to.contains(&uid("Alice")));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_a_directory() {
        let dir = tempfile::TempDir::new().unwrap();

        let store = InMemoryGraphStore::open(dir.path()).await.unwrap();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        store.add_node(NodeData::new(uid("Acme"), "Acme", "organization")).await.unwrap();
        store.add_edge(EdgeData::new(uid("Alice"), uid("Acme")), true).await.unwrap();
        store.flush().await.unwrap();

        let reopened = InMemoryGraphStore::open(dir.path()).await.unwrap();
        let alice = reopened.get_node(&uid("Alice")).await.unwrap();
        assert!(alice.edges_to.contains(&uid("Acme")));
        assert!(reopened.get_edge(&uid("Alice"), &uid("Acme")).await.is_ok());
    }

    #[tokio::test]
    async fn repair_adjacency_rebuilds_from_edges() {
        let store = InMemoryGraphStore::new();
        store.add_node(NodeData::new(uid("Alice"), "Alice", "person")).await.unwrap();
        store.add_node(NodeData::new(uid("Acme"), "Acme", "organization")).await.unwrap();
        store.add_edge(EdgeData::new(uid("Alice"), uid("Acme")), true).await.unwrap();

        // Simulate crash: clear adjacency but not the edge collection.
        {
            let mut n = store.nodes.get_mut(&uid("Alice")).unwrap();
            n.edges_to.clear();
        }
        let touched = store.repair_adjacency().await.unwrap();
        assert!(touched >= 1);
        let alice = store.get_node(&uid("Alice")).await.unwrap();
        assert!(alice.edges_to.contains(&uid("Acme")));
    }
}
