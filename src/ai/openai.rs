use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AIMessage, AIResponse, ChatGateway};
use crate::config::AppConfig;
use crate::error::GatewayError;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [AIMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: Option<ChatCompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client (Groq by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    vision_model: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(config: &AppConfig) -> Result<Self, GatewayError> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
        })
    }

    /// The vision model only applies when it is configured and the request carries images.
    pub fn model_for(&self, messages: &[AIMessage]) -> &str {
        match &self.vision_model {
            Some(vision) if messages.iter().any(AIMessage::has_images) => vision,
            _ => &self.model,
        }
    }
}

impl ChatGateway for ChatCompletionClient {
    async fn complete(&self, messages: &[AIMessage]) -> Result<AIResponse, GatewayError> {
        if self.api_key.is_empty() {
            return Err(GatewayError::CredentialMissing);
        }

        let model = self.model_for(messages);
        let request = ChatCompletionRequest {
            model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        log::info!(
            "Sending {} message(s) to {} with model {}",
            messages.len(),
            self.api_url,
            model
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if let Some(err) = classify_status(status) {
            log::warn!("Chat completion failed ({}): {}", status, truncate(&body, 300));
            return Err(err);
        }

        let content = extract_reply(&body)?;
        log::debug!("Received {} characters from {}", content.len(), model);

        Ok(AIResponse {
            content,
            model: model.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl ChatCompletionClient {
    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Unreachable(format!(
                "no reply within {} seconds",
                self.timeout.as_secs()
            ))
        } else {
            GatewayError::Unreachable(format!("request failed: {}", e))
        }
    }
}

/// `None` for success statuses.
pub fn classify_status(status: StatusCode) -> Option<GatewayError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        other => GatewayError::Unreachable(format!("HTTP status {}", other.as_u16())),
    })
}

/// Pulls `choices[0].message.content` out of a response body.
pub fn extract_reply(body: &str) -> Result<String, GatewayError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
