// Map Worker (spec.md S4.E): stateless scoring of one (query, community) pair.
// The HTTP entry point lives in `http_server.rs`; this module is the scoring
// logic it (and any non-HTTP caller) delegates to.

use crate::contracts::{Completion, CompletionParams};
use crate::errors::Result;
use crate::graph::CommunityData;
use crate::observability::{log_operation, Operation, OperationContext};
use crate::query::rendezvous::PartialAnswer;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    response: String,
    score: i32,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "response": {"type": "string"},
            "score": {"type": "integer", "minimum": 0, "maximum": 10}
        },
        "required": ["response", "score"]
    })
}

const SYSTEM_PROMPT: &str = "You are one of many workers answering a user query from a single \
community's perspective. Respond with a single JSON object: a short natural-language answer drawn \
only from the given community context, and an integer relevance score 0-10 (0 meaning the \
community is irrelevant to the query).";

fn build_prompt(community: &CommunityData, user_query: &str) -> String {
    let members = community.community_nodes.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ");
    format!(
        "Community title: {}\nSummary: {}\nRating: {} ({})\nMembers: {}\n\nUser query: {}",
        community.title, community.summary, community.rating, community.rating_explanation, members, user_query
    )
}

/// Score one community against one query (spec.md S4.E steps 2-4). Never
/// fails: a malformed Completion response degrades to the documented fallback
/// rather than propagating a `ParseError`.
pub async fn score_community(
    completion: &dyn Completion,
    community: &CommunityData,
    user_query: &str,
) -> Result<PartialAnswer> {
    let ctx = OperationContext::new("query.worker.score_community");
    let prompt = build_prompt(community, user_query);
    let params = CompletionParams { response_schema: Some(response_schema()), temperature: 0.0, ..Default::default() };

    let raw = completion.generate(SYSTEM_PROMPT, &prompt, params).await?;
    let parsed: std::result::Result<ScoreResponse, _> = serde_json::from_str(&raw);

    let (response, score) = match parsed {
        Ok(r) if (0..=10).contains(&r.score) => (r.response, r.score),
        _ => ("Answer cannot be provided based on context".to_string(), 0),
    };

    log_operation(
        &ctx,
        &Operation::MapScore { community_uid: community.community_uid.to_string(), score: score as u8 },
        &Ok(()),
    );

    Ok(PartialAnswer {
        community_uid: community.community_uid.to_string(),
        community_title: community.title.clone(),
        response,
        score,
    })
}
