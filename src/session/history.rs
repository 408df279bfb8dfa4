use serde::{Deserialize, Serialize};

use crate::ai::format::FormattedReply;
use crate::ai::{AIMessage, Role};
use crate::intake::photos::PhotoAttachment;

/// How many stored turns accompany each outbound request.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

impl From<Speaker> for Role {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => Role::User,
            Speaker::Assistant => Role::Assistant,
        }
    }
}

/// A user message that has been composed but not yet delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub content: String,
    pub images: Vec<PhotoAttachment>,
}

impl PendingTurn {
    pub fn new(content: impl Into<String>, images: Vec<PhotoAttachment>) -> Self {
        Self {
            content: content.into(),
            images,
        }
    }

    fn to_message(&self) -> AIMessage {
        user_message(&self.content, &self.images)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// 1-based position in the session's conversation.
    pub seq: u64,
    pub speaker: Speaker,
    /// Raw text, exactly as sent to or received from the model.
    pub content: String,
    pub images: Vec<PhotoAttachment>,
    /// Display form of assistant replies.
    pub rendered: Option<FormattedReply>,
    pub timestamp: String,
}

impl ConversationTurn {
    fn to_message(&self) -> AIMessage {
        match self.speaker {
            Speaker::User => user_message(&self.content, &self.images),
            Speaker::Assistant => AIMessage::text(Role::Assistant, self.content.clone()),
        }
    }
}

fn user_message(content: &str, images: &[PhotoAttachment]) -> AIMessage {
    AIMessage::with_images(
        Role::User,
        content,
        images.iter().map(PhotoAttachment::data_url).collect(),
    )
}

/// Every turn of the conversation, kept in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    next_seq: u64,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        speaker: Speaker,
        content: String,
        images: Vec<PhotoAttachment>,
        rendered: Option<FormattedReply>,
    ) -> &ConversationTurn {
        self.next_seq += 1;
        self.turns.push(ConversationTurn {
            seq: self.next_seq,
            speaker,
            content,
            images,
            rendered,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn append_user(&mut self, turn: PendingTurn) -> &ConversationTurn {
        self.push(Speaker::User, turn.content, turn.images, None)
    }

    pub fn append_assistant(&mut self, content: String, rendered: FormattedReply) -> &ConversationTurn {
        self.push(Speaker::Assistant, content, Vec::new(), Some(rendered))
    }

    /// Full history, for display.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The stored turns that go out with the next request.
    pub fn window(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(HISTORY_WINDOW);
        &self.turns[start..]
    }

    /// System instruction, the last [`HISTORY_WINDOW`] turns oldest first, then `outgoing`.
    pub fn assemble(&self, system_prompt: &str, outgoing: &PendingTurn) -> Vec<AIMessage> {
        let window = self.window();
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(AIMessage::text(Role::System, system_prompt));
        messages.extend(window.iter().map(ConversationTurn::to_message));
        messages.push(outgoing.to_message());
        messages
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.next_seq = 0;
    }
}
