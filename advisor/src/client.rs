//! HTTP advisor client
//!
//! Speaks an OpenAI-compatible chat-completions wire: one blocking call
//! shape for the structured analysis/fix operations and an SSE token stream
//! for the reasoning variant. A 429 from the provider maps to
//! `AdvisorError::Quota` so callers can distinguish "retry later" from a
//! real failure.

use crate::{
    prompts, schema, AdvisorError, BugFinding, CodeAnalysis, ReasoningStream, RepairAdvisor,
};
use async_stream::try_stream;
use async_trait::async_trait;
use codemend_core::{AdvisorSettings, FixSuggestion};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Reasoning-provider client over HTTP
#[derive(Debug, Clone)]
pub struct HttpAdvisor {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpAdvisor {
    pub fn new(settings: &AdvisorSettings) -> Result<Self, AdvisorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| AdvisorError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, AdvisorError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| AdvisorError::Transport(format!("invalid api key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn request_body(&self, system: &str, user: &str, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "stream": stream
        })
    }

    /// One buffered chat call; returns the assistant message content.
    async fn chat(&self, system: &str, user: &str) -> Result<String, AdvisorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&self.request_body(system, user, false))
            .send()
            .await
            .map_err(|e| AdvisorError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdvisorError::Quota);
        }
        if !status.is_success() {
            return Err(AdvisorError::Transport(format!(
                "provider returned {status}"
            )));
        }

        let payload: ChatCompletion = response
            .json()
            .await
            .map_err(|e| AdvisorError::Schema(format!("completion did not parse: {e}")))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AdvisorError::Schema("completion is missing choices[0].message.content".to_string())
            })
    }
}

#[async_trait]
impl RepairAdvisor for HttpAdvisor {
    async fn analyze(&self, code: &str) -> Result<CodeAnalysis, AdvisorError> {
        debug!("Requesting safety and bug analysis");
        let content = self
            .chat(prompts::ANALYZE_SYSTEM, &prompts::analyze_prompt(code))
            .await?;
        schema::parse_analysis(&content)
    }

    async fn propose_fix(
        &self,
        code: &str,
        prior: Option<&BugFinding>,
    ) -> Result<FixSuggestion, AdvisorError> {
        debug!("Requesting structured fix (retry context: {})", prior.is_some());
        let content = self
            .chat(prompts::FIX_SYSTEM, &prompts::fix_prompt(code, prior))
            .await?;
        schema::parse_fix_suggestion(&content)
    }

    async fn stream_fix_reasoning(
        &self,
        code: &str,
        error_message: &str,
    ) -> Result<ReasoningStream, AdvisorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&self.request_body(
                prompts::STREAM_SYSTEM,
                &prompts::stream_prompt(code, error_message),
                true,
            ))
            .send()
            .await
            .map_err(|e| AdvisorError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdvisorError::Quota);
        }
        if !status.is_success() {
            return Err(AdvisorError::Transport(format!(
                "provider returned {status}"
            )));
        }

        let stream = try_stream! {
            let mut buffer = String::new();
            let mut bytes = response.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| AdvisorError::Stream(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited; carry partial lines
                while let Some(position) = buffer.find('\n') {
                    let line = buffer[..position].trim().to_string();
                    buffer.drain(..=position);
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        return;
                    }
                    if let Ok(frame) = serde_json::from_str::<StreamFrame>(payload) {
                        for choice in frame.choices {
                            if let Some(content) = choice.delta.and_then(|d| d.content) {
                                if !content.is_empty() {
                                    yield content;
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// Minimal response shapes for the OpenAI-compatible wire

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
