//! Data models for chat requests, replies and streamed records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation, as sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
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
}

/// Reason for finishing the response generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    OutputTokens,
    /// The model was only loaded; nothing was generated.
    Load,
    Other(String),
}

impl From<&str> for FinishReason {
    fn from(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::OutputTokens,
            "load" => FinishReason::Load,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

/// A complete, non-streamed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The assistant message
    pub message: Message,

    /// Name of the model that produced the reply
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    pub finish: FinishReason,
}

/// Streaming response chunk - can be a text delta, usage, or finish information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamChunk {
    /// Incremental text to append to the reply
    Data(String),

    /// Token usage information
    Usage(Usage),

    /// Finish reason
    Finish(FinishReason),
}

/// A model available on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
}

/// One JSON value decoded from one line of an NDJSON stream.
///
/// The decoder does not interpret the value. The accessors read the fields
/// of an Ollama chat chunk and return `None` (or `false`) when a field is
/// missing or has the wrong type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedRecord(Value);

impl ParsedRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Text carried by `message.content`, if non-empty.
    pub fn content_delta(&self) -> Option<&str> {
        self.0["message"]["content"]
            .as_str()
            .filter(|content| !content.is_empty())
    }

    /// Whether this record closes the assistant turn.
    pub fn is_done(&self) -> bool {
        self.0["done"].as_bool().unwrap_or(false)
    }

    pub fn done_reason(&self) -> Option<&str> {
        self.0["done_reason"].as_str()
    }

    /// In-band error reported by the server in place of a chunk.
    pub fn error(&self) -> Option<&str> {
        self.0["error"].as_str()
    }

    /// Token counts, present on the final record of a turn.
    pub fn usage(&self) -> Option<Usage> {
        let count = |key: &str| self.0[key].as_u64().and_then(|n| u32::try_from(n).ok());
        let usage = Usage {
            prompt_tokens: count("prompt_eval_count"),
            completion_tokens: count("eval_count"),
        };
        (usage.prompt_tokens.is_some() || usage.completion_tokens.is_some()).then_some(usage)
    }
}

impl From<Value> for ParsedRecord {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
