//! Streaming client for the Gemini `streamGenerateContent` endpoint.

use anyhow::{Result, anyhow, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::time::Duration;

use crate::auth::token_store;
use crate::config::ModelConfig;
use crate::llm::sse::SseEvents;
use crate::llm::{FragmentStream, ModelClient, Role, TurnRequest};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

impl Content {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        // Streams stay open for as long as the model writes.
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        })
    }

    /// API key comes from the configured env var, then the keyring.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = match std::env::var(&cfg.api_key_env) {
            Ok(k) if !k.trim().is_empty() => k,
            _ => token_store::load_model_key()?.ok_or_else(|| {
                anyhow!(
                    "no model API key: set {} or run `policy_chat set-model-key`",
                    cfg.api_key_env
                )
            })?,
        };

        let mut client = Self::new(api_key, cfg.model.clone())?;
        client.temperature = cfg.temperature;
        if let Some(base) = &cfg.api_base {
            client.api_base = base.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> GenerateRequest {
        let mut contents = Vec::with_capacity(request.history.len() + 2);
        contents.push(Content::text("user", request.preamble()));
        for m in request.history {
            let role = match m.role {
                Role::Human => "user",
                Role::Ai => "model",
            };
            contents.push(Content::text(role, m.content.clone()));
        }
        contents.push(Content::text("user", request.input));

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

/// Text carried by one SSE payload; `None` for chunks without text.
fn chunk_text(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| anyhow!("failed to parse stream chunk: {e}"))?;

    if let Some(err) = chunk.error {
        bail!(
            "Gemini stream error {}: {}",
            err.code.unwrap_or_default(),
            err.message
        );
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    Ok((!text.is_empty()).then_some(text))
}

impl ModelClient for GeminiClient {
    fn stream<'a>(&'a self, request: &TurnRequest<'_>) -> Result<FragmentStream<'a>> {
        let body = self.build_request(request);
        debug!(
            "gemini request: model={} messages={}",
            self.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("Gemini API error {status}: {text}");
        }

        let events = SseEvents::new(BufReader::new(response));
        Ok(Box::new(events.filter_map(|event| match event {
            Ok(data) => chunk_text(&data).transpose(),
            Err(e) => Some(Err(e.into())),
        })))
    }
}
