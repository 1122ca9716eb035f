use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::LlmSettings;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A named JSON schema the model's reply must conform to.
#[derive(Debug, Clone)]
pub struct JsonSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// One function invocation requested by the model. `arguments` is the raw JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Chat completion seam used by answer and diagram generation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Completion constrained to `schema`; returns the parsed JSON object.
    async fn complete_json(&self, messages: &[Message], schema: &JsonSchema) -> Result<Value>;

    /// Completion offered `tools`; returns every tool invocation in the reply (possibly none).
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<Vec<ToolInvocation>>;
}

/// Text-to-vector seam used by retrieval and index building.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Schema("empty embedding response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(RagError::MissingCredential);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    /// Resolve an API route (`chat/completions`, `embeddings`) against the base URL.
    fn endpoint(&self, route: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, route)
        } else {
            format!("{}/v1/{}", base, route)
        }
    }

    async fn post(&self, route: &str, body: &impl Serialize) -> Result<Value> {
        let resp = self
            .client
            .post(self.endpoint(route))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete_json(&self, messages: &[Message], schema: &JsonSchema) -> Result<Value> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            }
        });

        let json = self.post("chat/completions", &body).await?;
        parse_structured_content(&json)
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<Vec<ToolInvocation>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "tools": tools,
        });

        let json = self.post("chat/completions", &body).await?;
        parse_tool_calls(&json)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let json = self.post("embeddings", &request).await?;
        let mut resp: EmbeddingResponse = serde_json::from_value(json)?;
        if resp.data.len() != texts.len() {
            return Err(RagError::Schema(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                resp.data.len()
            )));
        }
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

fn first_message(body: &Value) -> Result<&Value> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| RagError::Schema("response contained no choices".to_string()))
}

/// Extract the schema-constrained JSON object from `choices[0].message.content`.
fn parse_structured_content(body: &Value) -> Result<Value> {
    let message = first_message(body)?;

    if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
        return Err(RagError::Schema(format!("model refused: {}", refusal)));
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| RagError::Schema("response has no content".to_string()))?;

    serde_json::from_str(content).map_err(|e| RagError::Schema(e.to_string()))
}

/// Collect `choices[0].message.tool_calls`. A missing or null list means no invocations.
fn parse_tool_calls(body: &Value) -> Result<Vec<ToolInvocation>> {
    let message = first_message(body)?;
    let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) else {
        return Ok(vec![]);
    };

    calls
        .iter()
        .map(|tc| {
            let func = tc
                .get("function")
                .ok_or_else(|| RagError::Schema("tool call without function".to_string()))?;
            Ok(ToolInvocation {
                id: tc
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: func
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                arguments: func
                    .get("arguments")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> RagError {
    match status.as_u16() {
        401 | 403 => {
            debug!(body = %body, "credential rejected");
            RagError::Unauthorized
        }
        429 => RagError::RateLimited,
        code => RagError::Service {
            status: code,
            body: body.to_string(),
        },
    }
}
