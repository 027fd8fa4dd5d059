//! Data Transfer Objects (DTOs) for the HTTP response contract.
//!
//! Request bodies are validated straight from JSON by `aigate_core::validate`;
//! only successful responses need explicit wire types.

use aigate_core::{ChatRole, EndpointKind};
use serde::Serialize;

/// Assistant message inside a chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantMessageDto {
    pub role: ChatRole,
    pub content: String,
}

/// Buffered (non-streaming) response body, one shape per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CompletionDto {
    Chat {
        id: String,
        message: AssistantMessageDto,
    },
    Vision {
        id: String,
        result: String,
    },
    Speech {
        id: String,
        transcript: String,
    },
}

impl CompletionDto {
    /// Wrap a backend result in the response shape for `kind`.
    pub fn new(kind: EndpointKind, id: String, text: String) -> Self {
        match kind {
            EndpointKind::Chat => Self::Chat {
                id,
                message: AssistantMessageDto {
                    role: ChatRole::Assistant,
                    content: text,
                },
            },
            EndpointKind::Vision => Self::Vision { id, result: text },
            EndpointKind::Speech => Self::Speech {
                id,
                transcript: text,
            },
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
}
