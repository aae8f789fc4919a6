// Query Orchestrator (spec.md S4.D): fans a query out to one map worker per
// community, polls the Rendezvous Store until enough have reported (or times
// out), then reduces the surviving partial answers into one prose answer.

use crate::config::Config;
use crate::contracts::{Completion, CompletionParams, MessageBus};
use crate::errors::{GraphRagError, Result};
use crate::graph::GraphStore;
use crate::observability::{log_operation, Operation, OperationContext};
use crate::query::bus::fan_out;
use crate::query::rendezvous::{PartialAnswer, RendezvousStore};
use crate::types::CommunityUid;

const REDUCE_SYSTEM_PROMPT: &str = "You are synthesizing a final answer to a user's question from \
several independent community reports. Write an academic-style, multi-paragraph answer grounded only \
in the supplied context. Do not fabricate facts absent from the context.";

fn build_reduce_prompt(user_query: &str, context: &[(PartialAnswer, Option<String>)]) -> String {
    let mut body = format!("User query: {user_query}\n\nCommunity reports (highest relevance first):\n");
    for (answer, summary) in context {
        body.push_str(&format!(
            "- [{}] score={} response=\"{}\"",
            answer.community_title, answer.score, answer.response
        ));
        if let Some(summary) = summary {
            body.push_str(&format!(" summary=\"{summary}\""));
        }
        body.push('\n');
    }
    body
}

/// The final context set `F` plus the answer text and elapsed wall-clock time,
/// for callers that want observability into which communities contributed —
/// e.g. the CLI's `query` subcommand, which reports timing and reports which
/// communities survived to stderr/stdout alongside the answer text.
#[derive(Debug, Clone)]
pub struct AnswerTrace {
    pub response: String,
    pub final_context: Vec<PartialAnswer>,
    pub elapsed: std::time::Duration,
}

/// Run the full answer procedure of spec.md S4.D, discarding the trace detail
/// `answer_with_trace` returns. Returns `Timeout` if the rendezvous poll never
/// reaches the completion threshold within `config.max_poll_attempts`.
pub async fn answer(
    store: &dyn GraphStore,
    bus: &dyn MessageBus,
    rendezvous: &dyn RendezvousStore,
    completion: &dyn Completion,
    config: &Config,
    user_query: &str,
) -> Result<String> {
    answer_with_trace(store, bus, rendezvous, completion, config, user_query).await.map(|trace| trace.response)
}

/// As `answer`, but also returns the final context set `F` that fed the
/// reducer and the total wall-clock time spent (SPEC_FULL S4.D expansion).
pub async fn answer_with_trace(
    store: &dyn GraphStore,
    bus: &dyn MessageBus,
    rendezvous: &dyn RendezvousStore,
    completion: &dyn Completion,
    config: &Config,
    user_query: &str,
) -> Result<AnswerTrace> {
    let started = std::time::Instant::now();
    let ctx = OperationContext::new("query.orchestrator.answer");

    // Step 1-2: load community reports, fan out one work item per community.
    let communities = store.list_communities().await?;
    log_operation(
        &ctx,
        &Operation::QueryFanOut { community_count: communities.len(), user_query: user_query.to_string() },
        &Ok(()),
    );
    fan_out(bus, &config.bus_topic_id, &communities, user_query).await?;

    // Step 3: poll the rendezvous store.
    let threshold = config.completion_threshold(communities.len()).max(1);
    tokio::time::sleep(config.warmup_sleep).await;

    let mut document = None;
    for attempt in 0..config.max_poll_attempts {
        let observed = rendezvous.get(user_query).await?;
        let size = observed.as_ref().map(|d| d.len()).unwrap_or(0);
        log_operation(
            &ctx,
            &Operation::RendezvousPoll { attempt, observed: size, required: threshold },
            &Ok(()),
        );
        if size >= threshold {
            document = observed;
            break;
        }
        if attempt + 1 < config.max_poll_attempts {
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    let Some(document) = document else {
        return Err(GraphRagError::Timeout(format!(
            "rendezvous poll for {user_query:?} did not reach {threshold} of {} communities within {} attempts",
            communities.len(),
            config.max_poll_attempts
        )));
    };

    // Step 4: filter, sort descending by score, truncate to max_responses.
    let mut partials: Vec<PartialAnswer> =
        document.into_values().filter(|a| a.score > config.relevance_threshold).collect();
    partials.sort_by(|a, b| b.score.cmp(&a.score));
    partials.truncate(config.max_responses);

    // Step 5: materialize the richer CommunityData context for each survivor.
    let final_context = partials.clone();
    let mut context = Vec::with_capacity(partials.len());
    for answer in partials {
        let summary = match CommunityUid::new(answer.community_uid.clone()) {
            Ok(uid) => store.get_community(&uid).await.ok().map(|c| c.summary),
            Err(_) => None,
        };
        context.push((answer, summary));
    }

    // Step 6: reduce.
    let prompt = build_reduce_prompt(user_query, &context);
    let params = CompletionParams { temperature: config.reduce_temperature, ..Default::default() };
    let response = completion.generate(REDUCE_SYSTEM_PROMPT, &prompt, params).await?;

    log_operation(&ctx, &Operation::QueryReduce { context_size: context.len() }, &Ok(()));

    // Step 7.
    Ok(AnswerTrace { response, final_context, elapsed: started.elapsed() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::contracts::InProcessMessageBus;
    use crate::graph::InMemoryGraphStore;
    use crate::query::rendezvous::InMemoryRendezvousStore;
    use crate::query::worker::score_community;
    use crate::types::NodeUid;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    struct ScriptedCompletion {
        scores: std::collections::HashMap<String, i32>,
        reduce_response: String,
    }

    #[async_trait]
    impl Completion for ScriptedCompletion {
        async fn generate(&self, system_prompt: &str, user_prompt: &str, _params: CompletionParams) -> Result<String> {
            if system_prompt == REDUCE_SYSTEM_PROMPT {
                return Ok(self.reduce_response.clone());
            }
            for (title, score) in &self.scores {
                if user_prompt.contains(title) {
                    return Ok(json!({"response": format!("answer from {title}"), "score": score}).to_string());
                }
            }
            Ok(json!({"response": "unscored", "score": 0}).to_string())
        }
    }

    async fn store_with_communities(titles: &[&str]) -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        for (i, title) in titles.iter().enumerate() {
            let mut members = BTreeSet::new();
            members.insert(NodeUid::new(title).unwrap());
            let community = crate::graph::CommunityData::new(
                crate::types::CommunityUid::for_cluster(0, i),
                *title,
                members,
            );
            store.store_community(community).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn scenario_5_final_context_is_sorted_nonzero_entries() {
        let store = store_with_communities(&["C1", "C2", "C3"]).await;
        let rendezvous = Arc::new(InMemoryRendezvousStore::new());
        let completion = ScriptedCompletion {
            scores: [("C1".to_string(), 8), ("C2".to_string(), 3), ("C3".to_string(), 0)].into_iter().collect(),
            reduce_response: "Synthesized answer.".to_string(),
        };

        let rendezvous_for_bus = rendezvous.clone();
        let bus = InProcessMessageBus::new(move |_topic, payload| {
            let rendezvous = rendezvous_for_bus.clone();
            Box::pin(async move {
                let item: crate::query::bus::WorkItem = serde_json::from_slice(&payload).unwrap();
                let completion = ScriptedCompletion {
                    scores: [("C1".to_string(), 8), ("C2".to_string(), 3), ("C3".to_string(), 0)]
                        .into_iter()
                        .collect(),
                    reduce_response: String::new(),
                };
                let answer = score_community(&completion, &item.community_report, &item.user_query).await?;
                rendezvous.put(&item.user_query, item.community_report.community_uid.as_str(), answer).await
            })
        });

        let config = ConfigBuilder::new()
            .warmup_sleep(Duration::from_millis(1))
            .poll_interval(Duration::from_millis(1))
            .max_poll_attempts(5)
            .completion_threshold_fraction(0.9)
            .build();

        let result = answer(&store, &bus, rendezvous.as_ref(), &completion, &config, "Who won X?").await.unwrap();
        assert_eq!(result, "Synthesized answer.");
    }

    #[tokio::test]
    async fn scenario_6_times_out_when_too_few_workers_report() {
        let store = store_with_communities(&["C1", "C2", "C3", "C4", "C5", "C6", "C7", "C8", "C9", "C10"]).await;
        let rendezvous = InMemoryRendezvousStore::new();
        // Only 5 of 10 communities ever report.
        for i in 0..5 {
            rendezvous
                .put(
                    "Who won X?",
                    &format!("C{}", i + 1),
                    PartialAnswer {
                        community_uid: format!("community_L0_{i}"),
                        community_title: format!("C{}", i + 1),
                        response: "partial".into(),
                        score: 5,
                    },
                )
                .await
                .unwrap();
        }
        let bus = InProcessMessageBus::new(|_topic, _payload| Box::pin(async { Ok(()) }));
        let completion = ScriptedCompletion { scores: Default::default(), reduce_response: String::new() };
        let config = ConfigBuilder::new()
            .warmup_sleep(Duration::from_millis(1))
            .poll_interval(Duration::from_millis(1))
            .max_poll_attempts(3)
            .completion_threshold_fraction(0.9)
            .build();

        let err = answer(&store, &bus, &rendezvous, &completion, &config, "Who won X?").await.unwrap_err();
        assert!(matches!(err, GraphRagError::Timeout(_)));
    }
}
