// Message-bus payload shapes (spec.md S6 "Message-bus payload") and the
// fan-out step of the Orchestrator procedure (spec.md S4.D step 2).

use crate::contracts::MessageBus;
use crate::errors::Result;
use crate::graph::CommunityData;
use serde::{Deserialize, Serialize};

/// `{community_report: <CommunityData JSON>, user_query: string}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub community_report: CommunityData,
    pub user_query: String,
}

/// Publish one `WorkItem` per community onto `topic` (spec.md S4.D step 2).
/// Fire-and-forget: success means the bus acknowledged receipt, not that any
/// worker has processed it yet.
pub async fn fan_out(
    bus: &dyn MessageBus,
    topic: &str,
    communities: &[CommunityData],
    user_query: &str,
) -> Result<Vec<String>> {
    let mut message_ids = Vec::with_capacity(communities.len());
    for community in communities {
        let item = WorkItem { community_report: community.clone(), user_query: user_query.to_string() };
        let payload = serde_json::to_vec(&item).map_err(|e| crate::errors::GraphRagError::Other(e.into()))?;
        message_ids.push(bus.publish(topic, payload).await?);
    }
    Ok(message_ids)
}
