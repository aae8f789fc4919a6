// Summarization (spec.md S4.C "Summarization"): assembles a per-community
// prompt from member nodes and incident edges, and asks the Completion
// collaborator for a strictly-typed JSON result. A parse failure degrades to
// an empty `CommunityData` rather than failing the run (scenario 4).

use crate::contracts::{Completion, CompletionParams};
use crate::errors::Result;
use crate::graph::{CommunityData, EdgeData, Finding, NodeData};
use crate::observability::{log_operation, Operation, OperationContext};
use crate::types::CommunityUid;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: String,
    summary: String,
    rating: i32,
    rating_explanation: String,
    findings: Vec<FindingResponse>,
}

#[derive(Debug, Deserialize)]
struct FindingResponse {
    summary: String,
    explanation: String,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "summary": {"type": "string"},
            "rating": {"type": "integer"},
            "rating_explanation": {"type": "string"},
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string"},
                        "explanation": {"type": "string"}
                    },
                    "required": ["summary", "explanation"]
                }
            }
        },
        "required": ["title", "summary", "rating", "rating_explanation", "findings"]
    })
}

/// Build the prompt body described in spec.md S4.C: one line per member node,
/// one line per incident edge (either direction).
fn build_prompt(members: &[NodeData], incident_edges: &[EdgeData]) -> String {
    let mut body = String::from("Entities:\n");
    for node in members {
        body.push_str(&format!(
            "- {{entity_id: {}, entity_type: {}, entity_description: {}}}\n",
            node.node_uid, node.node_type, node.node_description
        ));
    }
    body.push_str("\nRelationships:\n");
    for edge in incident_edges {
        body.push_str(&format!(
            "- {{edge_source: {}, edge_target: {}, edge_description: {}}}\n",
            edge.source_uid, edge.target_uid, edge.description
        ));
    }
    body
}

const SYSTEM_PROMPT: &str = "You are summarizing one community of a knowledge graph. \
Respond with a single JSON object matching the required schema: a short title, a \
one-paragraph summary, an integer importance rating 0-10, a one-sentence rating \
explanation, and a list of findings, each a short summary with a supporting explanation.";

/// Summarize one community's members, falling back to a degraded record on any
/// parse failure (spec.md S7 ParseError, S4.C).
pub async fn summarize_community(
    completion: &dyn Completion,
    community_uid: CommunityUid,
    members: &[NodeData],
    incident_edges: &[EdgeData],
) -> Result<CommunityData> {
    let ctx = OperationContext::new("community.summarize");
    let member_uids: BTreeSet<_> = members.iter().map(|n| n.node_uid.clone()).collect();

    let prompt = build_prompt(members, incident_edges);
    let params = CompletionParams { response_schema: Some(response_schema()), ..Default::default() };
    let raw = completion.generate(SYSTEM_PROMPT, &prompt, params).await?;

    let parsed: Result<SummaryResponse> =
        serde_json::from_str(&raw).map_err(|e| crate::errors::GraphRagError::ParseError(e.to_string()));

    match parsed {
        Ok(response) => {
            let mut community = CommunityData::new(community_uid, response.title, member_uids);
            community.summary = response.summary;
            community.rating = response.rating;
            community.rating_explanation = response.rating_explanation;
            community.findings = response
                .findings
                .into_iter()
                .map(|f| Finding { summary: f.summary, explanation: f.explanation })
                .collect();
            log_operation(
                &ctx,
                &Operation::CommunitySummarize { community_uid: community.community_uid.to_string(), degraded: false },
                &Ok(()),
            );
            Ok(community)
        }
        Err(err) => {
            let community = CommunityData::degraded(community_uid.clone(), member_uids);
            log_operation(
                &ctx,
                &Operation::CommunitySummarize { community_uid: community_uid.to_string(), degraded: true },
                &Err(anyhow::anyhow!(err.to_string())),
            );
            Ok(community)
        }
    }
}
