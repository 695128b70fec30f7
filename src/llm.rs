use std::fmt::Debug;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged entry of a conversation. Conversations are always
/// self-contained: the backend keeps no state between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn append_content(&mut self, extra: &str) {
        self.content.push_str(extra);
    }
}

/// Pass-through sampling knobs for the completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
}

fn default_temperature() -> f64 {
    0.8
}
fn default_top_p() -> f64 {
    0.9
}
fn default_top_k() -> u32 {
    40
}
fn default_repetition_penalty() -> f64 {
    1.1
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repetition_penalty: default_repetition_penalty(),
        }
    }
}

impl SamplingOptions {
    /// Scene prose benefits from slightly higher creativity.
    pub fn scene() -> Self {
        Self {
            temperature: 0.9,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// Sends a self-contained conversation and returns the assembled
    /// completion text.
    async fn complete(&self, messages: &[Message], options: &SamplingOptions) -> Result<String>;
}

/// The only case that fails fast: an unsupported backend name.
pub fn create_llm(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.llm.backend.as_str() {
        "koboldcpp" => Ok(Box::new(KoboldClient::new(config))),
        other => bail!("Backend must be 'koboldcpp', got '{other}'"),
    }
}

/// KoboldCpp client speaking the OpenAI-compatible streaming chat API.
#[derive(Debug)]
pub struct KoboldClient {
    endpoint: String,
    max_tokens: u32,
    retry_count: usize,
    retry_delay: Duration,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl KoboldClient {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.llm.endpoint.trim_end_matches('/').to_string(),
            max_tokens: config.llm.max_tokens,
            retry_count: config.llm.retry_count,
            retry_delay: Duration::from_secs(config.llm.retry_delay_seconds),
            request_timeout: Duration::from_secs(config.llm.request_timeout_seconds),
            client: reqwest::Client::new(),
        }
    }

    async fn stream_once(
        &self,
        messages: &[Message],
        options: &SamplingOptions,
    ) -> Result<String> {
        let body = json!({
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": true,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "top_k": options.top_k,
            "repetition_penalty": options.repetition_penalty,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            bail!("Completion API error ({status}): {error_text}");
        }

        // Assemble the streamed tokens into one string; the stream itself is
        // invisible to callers.
        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        let mut result = String::new();
        'read: while let Some(item) = stream.next().await {
            let chunk = item.context("Stream error")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    SseEvent::Token(token) => result.push_str(&token),
                    SseEvent::Done => break 'read,
                    SseEvent::Ignored => {}
                }
            }
        }
        // The stream may end without a trailing newline.
        if let SseEvent::Token(token) = parse_sse_line(buffer.trim()) {
            result.push_str(&token);
        }

        debug!("received {} characters from backend", result.len());
        Ok(result.trim().to_string())
    }
}

#[async_trait]
impl LlmClient for KoboldClient {
    async fn complete(&self, messages: &[Message], options: &SamplingOptions) -> Result<String> {
        let attempts = self.retry_count.max(1);
        let mut last_error = anyhow!("no completion attempts were made");
        for attempt in 0..attempts {
            if attempt > 0 {
                warn!("completion attempt {attempt}/{attempts} failed, retrying...");
                sleep(self.retry_delay).await;
            }
            match self.stream_once(messages, options).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("completion request error: {e:#}");
                    last_error = e;
                }
            }
        }
        Err(last_error.context("completion failed after retries"))
    }
}

enum SseEvent {
    Token(String),
    Done,
    Ignored,
}

/// Parses one SSE line of the streaming response. Lines that are not
/// well-formed data events are skipped rather than treated as errors.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.strip_prefix("data: ") else {
        return SseEvent::Ignored;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return SseEvent::Ignored;
    };
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(token) => SseEvent::Token(token.to_string()),
        None => SseEvent::Ignored,
    }
}
