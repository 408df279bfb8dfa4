pub mod enrichment;
pub mod format;
pub mod openai;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Plain text, or text followed by images for vision-capable models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl AIMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Falls back to plain text when there are no images.
    pub fn with_images(role: Role, text: impl Into<String>, image_urls: Vec<String>) -> Self {
        let text = text.into();
        if image_urls.is_empty() {
            return Self::text(role, text);
        }

        let mut parts = vec![ContentPart::Text { text }];
        parts.extend(
            image_urls
                .into_iter()
                .map(|url| ContentPart::ImageUrl { image_url: ImageUrl { url } }),
        );
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn has_images(&self) -> bool {
        match &self.content {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::ImageUrl { .. })),
        }
    }

    /// The text portion, ignoring images.
    pub fn text_content(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIResponse {
    pub content: String,
    pub model: String,
    pub timestamp: String,
}

/// One chat-completion round trip. Implementations never retry.
pub trait ChatGateway {
    fn complete(
        &self,
        messages: &[AIMessage],
    ) -> impl Future<Output = Result<AIResponse, GatewayError>> + Send;
}
