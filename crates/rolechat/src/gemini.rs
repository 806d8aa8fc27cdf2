//! Gemini `generateContent` REST client and the production [`ModelService`].
//!
//! The REST API is stateless, so a [`GeminiConversation`] keeps the context
//! locally and replays it with every request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::{GenerationParams, ModelName};
use crate::model::{
    ContextMessage, Conversation, ModelCache, ModelKey, ModelService, Reply, SendFuture,
    ServiceRole, UsageInfo,
};

// ── Constants ──────────────────────────────────────────────────────

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Replies are requested as plain text.
pub const RESPONSE_MIME_TYPE: &str = "text/plain";

// ── Request types ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ServiceRole>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn with_role(role: Option<ServiceRole>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

impl From<&ContextMessage> for Content {
    fn from(msg: &ContextMessage) -> Self {
        Self::with_role(Some(msg.role), &msg.text)
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: &'static str,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(p: &GenerationParams) -> Self {
        Self {
            temperature: p.temperature,
            top_p: p.top_p,
            top_k: p.top_k,
            max_output_tokens: p.max_output_tokens,
            response_mime_type: RESPONSE_MIME_TYPE,
        }
    }
}

/// `generateContent` request body.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn new(instruction: &str, contents: Vec<Content>, params: &GenerationParams) -> Self {
        let system_instruction = if instruction.trim().is_empty() {
            None
        } else {
            Some(Content::with_role(None, instruction))
        };
        Self {
            system_instruction,
            contents,
            generation_config: params.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
    usage_metadata: Option<RawUsage>,
    prompt_feedback: Option<RawPromptFeedback>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorResponse,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

// ── Client ─────────────────────────────────────────────────────────

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API root. Default: [`GEMINI_BASE_URL`].
    pub base_url: String,
    /// Per-request timeout. Default: 120 s.
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Async HTTP client for the Gemini `generateContent` endpoint.
///
/// Holds no credentials; the API key travels with each call.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rolechat/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: ModelName) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// Send one `generateContent` request.
    pub async fn generate(
        &self,
        api_key: &str,
        model: ModelName,
        body: &GenerateContentRequest,
    ) -> Result<Reply, String> {
        debug!(
            "Gemini request: model={}, contents={}, max_output_tokens={}, temp={}",
            model,
            body.contents.len(),
            body.generation_config.max_output_tokens,
            body.generation_config.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "Gemini response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or(text);
            return Err(format!("Gemini API HTTP {status}: {detail}"));
        }

        let parsed: RawResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("Gemini API error: {}", err.message));
        }

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            debug!("Gemini blocked the prompt: {reason}");
        }

        let usage = parsed.usage_metadata.map(|u| UsageInfo {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        if let Some(ref u) = usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                u.prompt_tokens.unwrap_or(0),
                u.completion_tokens.unwrap_or(0),
                u.total_tokens.unwrap_or(0),
            );
        }

        let candidate = parsed.candidates.into_iter().next();
        let (text, finish_reason) = match candidate {
            Some(c) => (
                c.content.map(|content| content.text()).unwrap_or_default(),
                c.finish_reason,
            ),
            None => (String::new(), None),
        };
        debug!("Gemini output: {} chars", text.len());

        Ok(Reply {
            text,
            finish_reason,
            usage,
        })
    }
}

// ── Model and conversation ─────────────────────────────────────────

/// A model configured with credentials and a system instruction.
pub struct GeminiModel {
    client: GeminiClient,
    key: ModelKey,
}

impl GeminiModel {
    pub fn new(client: GeminiClient, key: ModelKey) -> Self {
        Self { client, key }
    }

    pub fn name(&self) -> ModelName {
        self.key.model
    }

    /// Start a conversation whose context begins with `seed`.
    pub fn start_chat(self: &Arc<Self>, seed: Vec<ContextMessage>) -> GeminiConversation {
        GeminiConversation {
            model: self.clone(),
            context: seed,
        }
    }
}

/// Multi-turn context replayed on each `generateContent` call.
pub struct GeminiConversation {
    model: Arc<GeminiModel>,
    context: Vec<ContextMessage>,
}

impl Conversation for GeminiConversation {
    fn send<'a>(&'a mut self, text: &'a str, params: &'a GenerationParams) -> SendFuture<'a> {
        Box::pin(async move {
            let mut contents: Vec<Content> = self.context.iter().map(Content::from).collect();
            contents.push(Content::with_role(Some(ServiceRole::User), text));
            let body = GenerateContentRequest::new(&self.model.key.instruction, contents, params);

            let reply = self
                .model
                .client
                .generate(&self.model.key.api_key, self.model.key.model, &body)
                .await?;

            self.context.push(ContextMessage::user(text));
            self.context.push(ContextMessage::model(&reply.text));
            Ok(reply)
        })
    }

    fn context(&self) -> &[ContextMessage] {
        &self.context
    }
}

// ── Service ────────────────────────────────────────────────────────

/// [`ModelService`] backed by Gemini, with an explicit model cache.
pub struct GeminiService {
    client: GeminiClient,
    models: ModelCache<ModelKey, GeminiModel>,
}

impl GeminiService {
    pub fn new(config: &GeminiConfig) -> Result<Self, String> {
        Ok(Self {
            client: GeminiClient::new(config)?,
            models: ModelCache::new(),
        })
    }

    /// Configured model for `key`, created on first use.
    pub fn model(&self, key: &ModelKey) -> Result<Arc<GeminiModel>, String> {
        self.models.get_or_try_create(key, || {
            debug!("Configuring Gemini model {}", key.model);
            Ok(GeminiModel::new(self.client.clone(), key.clone()))
        })
    }

    pub fn models(&self) -> &ModelCache<ModelKey, GeminiModel> {
        &self.models
    }
}

impl ModelService for GeminiService {
    fn start_conversation(
        &self,
        key: &ModelKey,
        seed: Vec<ContextMessage>,
    ) -> Result<Box<dyn Conversation>, String> {
        let model = self.model(key)?;
        Ok(Box::new(model.start_chat(seed)))
    }

    fn release(&self, key: &ModelKey) {
        if self.models.invalidate(key) {
            debug!("Released Gemini model {} ({} cached)", key.model, self.models.len());
        }
    }
}
