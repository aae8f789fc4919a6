// Abstract collaborator interfaces (spec.md S6). These are capability
// interfaces with concrete implementations injected at construction (S9:
// "model these as explicit capability interfaces... no runtime type
// introspection is required") — the crate ships no concrete LLM provider,
// message-bus transport, or blob store; callers wire in their own.

use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Parameters accepted by a `Completion.generate` call.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// A JSON Schema the response is constrained to, when the provider supports it.
    pub response_schema: Option<Value>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self { max_tokens: 1024, temperature: 0.3, top_p: 1.0, response_schema: None }
    }
}

/// The text-generation collaborator. Used by the Community Engine's
/// summarizer and by the Map Worker's scorer and the Orchestrator's reducer.
///
/// # Preconditions
/// - `system_prompt` and `user_prompt` are non-empty.
///
/// # Postconditions
/// - On success, returns the raw response text; if `response_schema` was set,
///   callers are responsible for parsing and must treat parse failure as
///   `ParseError` (S7), not propagate it as a `Completion` failure.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, params: CompletionParams) -> Result<String>;
}

/// The embedding collaborator, used lazily — not on every merge (SPEC_FULL S3).
#[async_trait]
pub trait Embedding: Send + Sync {
    async fn embed(&self, text: &str, task_tag: &str, dim: usize) -> Result<Vec<f32>>;
}

/// The message bus the Orchestrator fans work items out on (spec.md S4.D step 2,
/// S5). At-least-once delivery is assumed; workers must be idempotent.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish is fire-and-forget from the caller's perspective: it returns once
    /// the bus acknowledges receipt, not once a subscriber has processed it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String>;
}

/// Raw blob storage, used only by the out-of-scope ingestion path (spec.md S1).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
}

/// An HTTP-backed `Completion`, for standalone CLI use against any endpoint
/// speaking the `{system_prompt, user_prompt, max_tokens, temperature, top_p,
/// response_schema?} -> {text}` contract. No particular provider is implied;
/// callers in a production deployment are expected to supply their own
/// `Completion` (S9 "no runtime type introspection... callers wire in their
/// own"). This one exists so the CLI has something to point at a local or
/// self-hosted endpoint without pulling in a provider SDK.
#[cfg(feature = "http-client")]
pub struct HttpCompletion {
    endpoint: String,
    client: reqwest::Client,
}

#[cfg(feature = "http-client")]
impl HttpCompletion {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
    }
}

#[cfg(feature = "http-client")]
#[derive(serde::Serialize)]
struct HttpCompletionRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    response_schema: Option<Value>,
}

#[cfg(feature = "http-client")]
#[derive(serde::Deserialize)]
struct HttpCompletionResponse {
    text: String,
}

#[cfg(feature = "http-client")]
#[async_trait]
impl Completion for HttpCompletion {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, params: CompletionParams) -> Result<String> {
        let body = HttpCompletionRequest {
            system_prompt,
            user_prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            response_schema: params.response_schema,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::errors::GraphRagError::TransientUpstream(e.to_string()))?;
        let parsed: HttpCompletionResponse = response
            .json()
            .await
            .map_err(|e| crate::errors::GraphRagError::TransientUpstream(e.to_string()))?;
        Ok(parsed.text)
    }
}

/// An in-process `MessageBus` that dispatches directly to a worker function,
/// for single-process deployments and for the integration tests in `tests/`.
/// Grounded in the job-worker pattern previously used for polling a queue: here
/// there is no queue to poll because the handler runs inline on publish.
pub struct InProcessMessageBus<F>
where
    F: Fn(String, Vec<u8>) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync,
{
    handler: F,
}

impl<F> InProcessMessageBus<F>
where
    F: Fn(String, Vec<u8>) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> MessageBus for InProcessMessageBus<F>
where
    F: Fn(String, Vec<u8>) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync,
{
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        (self.handler)(topic.to_string(), payload).await?;
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_bus_invokes_handler_and_returns_message_id() {
        let received = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let bus = InProcessMessageBus::new(move |topic, payload| {
            let received = received_clone.clone();
            Box::pin(async move {
                received.lock().await.push((topic, payload));
                Ok(())
            })
        });

        let id = bus.publish("topic", b"payload".to_vec()).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(received.lock().await.len(), 1);
    }
}
