//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   AnthropicBackend        : Anthropic Messages API (claude-*)
//!   OpenAiCompatibleBackend : any OpenAI-compatible chat endpoint (OpenAI,
//!                             OpenRouter, vLLM, Ollama, …)
//!
//! Every request goes through a [`SandboxClient`], so calls are limited to
//! allow-listed hosts and carry a fixed timeout.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use verdant_common::{SandboxClient, VerdantError};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] VerdantError),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_timeout())
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens as u64 + self.completion_tokens as u64
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

fn parse_anthropic_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    // Concatenate every text block; tool_use and thinking blocks are ignored.
    let content = json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    LlmResponse {
        content,
        model: json["model"].as_str().unwrap_or(fallback_model).to_string(),
        prompt_tokens:     json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

// ── 1. Anthropic (claude-*) ───────────────────────────────────────────────────

pub struct AnthropicBackend {
    pub model: String,
    pub base_url: String,
    api_key: SecretString,
    client: SandboxClient,
}

impl AnthropicBackend {
    pub fn new(client: SandboxClient, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key,
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.client.allow_url_host(&self.base_url);
        self
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Anthropic Messages API: split system prompt from user messages
        let system = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let messages: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let model = req.model.as_deref().unwrap_or(&self.model);

        let mut body = serde_json::json!({
            "model":       model,
            "messages":    messages,
            "max_tokens":  req.max_tokens.unwrap_or(2048),
            "temperature": req.temperature.unwrap_or(0.0),
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let resp = self.client
            .post(&url)?
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let json = check_response_status(resp).await?;
        let out = parse_anthropic_response(&json, model);
        debug!(model = %out.model, prompt_tokens = out.prompt_tokens, completion_tokens = out.completion_tokens, "Anthropic completion");
        Ok(out)
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── 2. OpenAI-Compatible ─────────────────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        mut client: SandboxClient,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        let base_url = base_url.into();
        client.allow_url_host(&base_url);
        Self { base_url, model: model.into(), api_key, client }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k.expose_secret()),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(2048),
            "temperature": req.temperature.unwrap_or(0.0),
        });
        let resp = self.auth(self.client.post(&url)?).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        let out = parse_openai_response(&json, &self.model);
        debug!(model = %out.model, prompt_tokens = out.prompt_tokens, completion_tokens = out.completion_tokens, "Chat completion");
        Ok(out)
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
