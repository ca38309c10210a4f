//! In-memory conversation bookkeeping.
//!
//! A [`ConversationStore`] is an explicit value owned by the caller. Nothing
//! here is process-wide; wrap the store in a lock if several tasks share it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Message, Role};

/// Longest title derived from a first question, in characters.
pub const TITLE_MAX_CHARS: usize = 50;

/// Length of the message preview in a [`ConversationSummary`], in characters.
pub const PREVIEW_MAX_CHARS: usize = 50;

pub const DEFAULT_TITLE: &str = "New conversation";

/// A message recorded in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ConversationMessage> for Message {
    fn from(msg: &ConversationMessage) -> Self {
        Message {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_TITLE.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Messages to send for a new question: the recorded history followed by
    /// the question itself.
    pub fn history_with(&self, question: &str) -> Vec<Message> {
        self.messages
            .iter()
            .map(Message::from)
            .chain(std::iter::once(Message::user(question)))
            .collect()
    }

    /// Record a completed question/answer pair.
    ///
    /// The first question of a conversation also becomes its title.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        if self.messages.is_empty() {
            self.title = derive_title(question);
        }

        let now = Utc::now();
        self.messages.push(ConversationMessage {
            role: Role::User,
            content: question.to_string(),
            timestamp: now,
        });
        self.messages.push(ConversationMessage {
            role: Role::Assistant,
            content: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_message: self
                .messages
                .last()
                .map(|m| m.content.chars().take(PREVIEW_MAX_CHARS).collect())
                .unwrap_or_default(),
            timestamp: self.created_at,
            message_count: self.messages.len(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

/// Listing entry for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
}

/// Title for a conversation opened by `message`.
///
/// # Example
/// ```
/// use ollachat::conversation::derive_title;
///
/// assert_eq!(derive_title("  Quels sont les débouchés ?  "), "Quels sont les débouchés ?");
/// assert_eq!(derive_title(&"é".repeat(60)), format!("{}...", "é".repeat(50)));
/// ```
pub fn derive_title(message: &str) -> String {
    let mut chars = message.trim().chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty conversation and return its id.
    pub fn create(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.conversations
            .insert(id.clone(), Conversation::new(id.clone()));
        tracing::debug!(conversation = %id, "conversation created");
        id
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Fetch a conversation, opening it under `id` if it does not exist yet.
    pub fn get_or_create(&mut self, id: &str) -> &mut Conversation {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation::new(id))
    }

    /// Summaries of every conversation, newest first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<_> = self.conversations.values().map(Conversation::summary).collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        summaries
    }

    /// Remove a conversation. Returns `false` if it did not exist.
    pub fn delete(&mut self, id: &str) -> bool {
        self.conversations.remove(id).is_some()
    }

    /// Drop conversations created more than `max_age` before `now`.
    ///
    /// Returns the ids that were removed.
    pub fn purge_older_than(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .conversations
            .values()
            .filter(|conv| conv.age(now) > max_age)
            .map(|conv| conv.id.clone())
            .collect();

        for id in &expired {
            self.conversations.remove(id);
            tracing::info!(conversation = %id, "expired conversation removed");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
