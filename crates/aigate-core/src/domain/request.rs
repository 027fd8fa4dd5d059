//! Typed request records for the three gateway endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The gateway endpoint a request was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Chat,
    Vision,
    Speech,
}

impl EndpointKind {
    /// All endpoint kinds, in routing order.
    pub const ALL: [Self; 3] = [Self::Chat, Self::Vision, Self::Speech];

    /// Path segment and rate-limit key prefix for this endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Vision => "vision",
            Self::Speech => "speech",
        }
    }

    /// Whether the endpoint can answer with a chunked NDJSON stream.
    ///
    /// A `stream: true` flag on an endpoint without this capability is ignored.
    #[must_use]
    pub const fn supports_streaming(self) -> bool {
        matches!(self, Self::Chat)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a wire role string. Only the three known roles are accepted.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single message in a chat conversation. `content` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /ai/chat`. `messages` has at least one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Content of the most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Body of `POST /ai/vision`. At least one image source is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of `POST /ai/speech`. At least one audio source is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A validated request, tagged by endpoint.
///
/// Produced only by [`crate::validation::validate`]; downstream code never
/// sees an untyped body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRequest {
    Chat(ChatRequest),
    Vision(VisionRequest),
    Speech(SpeechRequest),
}

impl GatewayRequest {
    #[must_use]
    pub const fn kind(&self) -> EndpointKind {
        match self {
            Self::Chat(_) => EndpointKind::Chat,
            Self::Vision(_) => EndpointKind::Vision,
            Self::Speech(_) => EndpointKind::Speech,
        }
    }

    /// Whether the caller asked for a streamed response.
    ///
    /// Only chat requests carry a `stream` flag.
    #[must_use]
    pub fn wants_stream(&self) -> bool {
        match self {
            Self::Chat(chat) => chat.stream.unwrap_or(false),
            Self::Vision(_) | Self::Speech(_) => false,
        }
    }
}
