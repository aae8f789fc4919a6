// The data model of S3: NodeData, EdgeData, CommunityData, and the invariants
// (I1-I5) that the store and builder enforce on them.

use crate::types::{CommunityUid, EdgeUid, NodeUid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Union the new fragment into the existing newline-split description set (I4).
/// Descriptions only ever grow under merge.
pub fn merge_description(existing: &str, incoming: &str) -> String {
    let mut fragments: Vec<&str> = existing.lines().filter(|l| !l.is_empty()).collect();
    for fragment in incoming.lines().filter(|l| !l.is_empty()) {
        if !fragments.contains(&fragment) {
            fragments.push(fragment);
        }
    }
    fragments.join("\n")
}

/// The set of description fragments of a node/edge, used by property P5.
pub fn description_fragments(description: &str) -> BTreeSet<&str> {
    description.lines().filter(|l| !l.is_empty()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub node_uid: NodeUid,
    /// Human-facing display name, which may differ in casing from `node_uid`.
    pub node_title: String,
    /// One of a closed small set (e.g. organization|person|geo|event) or empty.
    pub node_type: String,
    pub node_description: String,
    pub node_degree: u32,
    pub document_id: Option<String>,
    pub community_id: Option<String>,
    pub edges_to: BTreeSet<NodeUid>,
    pub edges_from: BTreeSet<NodeUid>,
    pub embedding: Vec<f32>,
}

impl NodeData {
    pub fn new(node_uid: NodeUid, node_title: impl Into<String>, node_type: impl Into<String>) -> Self {
        let node_title = node_title.into();
        Self {
            node_uid,
            node_title,
            node_type: node_type.into(),
            node_description: String::new(),
            node_degree: 0,
            document_id: None,
            community_id: None,
            edges_to: BTreeSet::new(),
            edges_from: BTreeSet::new(),
            embedding: Vec::new(),
        }
    }

    /// Merge another extraction of the same node into this one, per spec.md S4.B:
    /// union descriptions, union source document ids, widen the type only if it was empty.
    pub fn merge_from(&mut self, description: &str, node_type: &str, document_id: Option<&str>) {
        self.node_description = merge_description(&self.node_description, description);
        if self.node_type.is_empty() && !node_type.is_empty() {
            self.node_type = node_type.to_string();
        }
        if let Some(doc) = document_id {
            if self.document_id.as_deref() != Some(doc) {
                // document_id is single-valued in the original's node schema; the builder
                // tracks the full source-id list separately via `source_document_ids`.
                self.document_id = Some(doc.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub edge_uid: EdgeUid,
    pub source_uid: NodeUid,
    pub target_uid: NodeUid,
    pub description: String,
    pub document_id: Option<String>,
    pub weight: f64,
}

impl EdgeData {
    pub fn new(source_uid: NodeUid, target_uid: NodeUid) -> Self {
        let edge_uid = EdgeUid::derive(&source_uid, &target_uid);
        Self {
            edge_uid,
            source_uid,
            target_uid,
            description: String::new(),
            document_id: None,
            weight: 1.0,
        }
    }

    /// Merge policy (spec.md S4.B, Open Question a): descriptions union, weight sums.
    /// Summation is chosen (over replacement) because it is the only one of the two
    /// options that stays associative and order-independent under re-ingestion bursts;
    /// see DESIGN.md for the recorded decision.
    pub fn merge_from(&mut self, description: &str, weight: f64, document_id: Option<&str>) {
        self.description = merge_description(&self.description, description);
        self.weight += weight;
        if let Some(doc) = document_id {
            self.document_id = Some(doc.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub summary: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityData {
    pub community_uid: CommunityUid,
    pub title: String,
    pub community_nodes: BTreeSet<NodeUid>,
    pub summary: String,
    pub document_id: Option<String>,
    pub rating: i32,
    pub rating_explanation: String,
    pub findings: Vec<Finding>,
    pub embedding: Vec<f32>,
}

impl CommunityData {
    pub fn new(community_uid: CommunityUid, title: impl Into<String>, community_nodes: BTreeSet<NodeUid>) -> Self {
        Self {
            community_uid,
            title: title.into(),
            community_nodes,
            summary: String::new(),
            document_id: None,
            rating: 0,
            rating_explanation: String::new(),
            findings: Vec::new(),
            embedding: Vec::new(),
        }
    }

    /// A degraded record written when the Completion response fails to parse
    /// (spec.md S4.C Summarization, S7 ParseError, scenario 4): the community is
    /// never dropped, just recorded with empty analysis.
    pub fn degraded(community_uid: CommunityUid, community_nodes: BTreeSet<NodeUid>) -> Self {
        let title = format!(
            "{{{}}}",
            community_nodes.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
        );
        Self::new(community_uid, title, community_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_description_unions_fragments() {
        let merged = merge_description("Engineer.", "Works in Paris.");
        assert_eq!(merged, "Engineer.\nWorks in Paris.");
    }

    #[test]
    fn merge_description_is_idempotent() {
        let once = merge_description("Engineer.", "Works in Paris.");
        let twice = merge_description(&once, "Works in Paris.");
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_description_never_loses_fragments() {
        let before = "A.\nB.";
        let after = merge_description(before, "C.");
        let before_set = description_fragments(before);
        let after_set = description_fragments(&after);
        assert!(before_set.is_subset(&after_set));
    }

    #[test]
    fn edge_merge_sums_weight() {
        let s = crate::types::NodeUid::new("Alice").unwrap();
        let t = crate::types::NodeUid::new("Acme").unwrap();
        let mut edge = EdgeData::new(s, t);
        edge.merge_from("Works at.", 7.0, None);
        edge.merge_from("Works at.", 2.0, None);
        assert_eq!(edge.weight, 9.0);
        assert_eq!(edge.description, "Works at.");
    }

    #[test]
    fn degraded_community_uses_member_set_as_title() {
        let n = crate::types::NodeUid::new("Alice").unwrap();
        let mut members = BTreeSet::new();
        members.insert(n);
        let community = CommunityData::degraded(CommunityUid::new("c1").unwrap(), members);
        assert_eq!(community.summary, "");
        assert_eq!(community.rating, 0);
        assert!(community.title.contains("ALICE"));
    }
}
