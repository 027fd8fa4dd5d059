//! Request body validation.
//!
//! Converts an untyped JSON body into one of the typed request records.
//! Every failing field is reported (not just the first) so callers can
//! fix a request in one round trip. Unknown fields are ignored.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{
    ChatMessage, ChatRequest, ChatRole, EndpointKind, GatewayRequest, SpeechRequest,
    VisionRequest,
};

/// Error code carried by every validation failure.
pub const BAD_REQUEST: &str = "bad_request";

const EITHER_IMAGE: &str = "one of imageUrl or imageBase64 is required";
const EITHER_AUDIO: &str = "one of audioUrl or audioBase64 is required";

/// Field-level validation failure.
///
/// `details` maps a field path (`messages`, `messages[2].role`, `imageUrl`)
/// to the rule it broke. Safe to return to callers verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    details: BTreeMap<String, String>,
}

impl ValidationError {
    /// Failure on a single field.
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut error = Self::default();
        error.push(field, reason);
        error
    }

    fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.details.entry(field.into()).or_insert_with(|| reason.into());
    }

    fn has(&self, field: &str) -> bool {
        self.details.contains_key(field)
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.details.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        BAD_REQUEST
    }

    #[must_use]
    pub const fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid request")?;
        for (i, (field, reason)) in self.details.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{field} {reason}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validate a raw body for the given endpoint.
pub fn validate(kind: EndpointKind, raw: &[u8]) -> Result<GatewayRequest, ValidationError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ValidationError::field("body", format!("is not valid JSON ({e})")))?;

    let Value::Object(body) = value else {
        return Err(ValidationError::field("body", "must be a JSON object"));
    };

    match kind {
        EndpointKind::Chat => validate_chat(&body).map(GatewayRequest::Chat),
        EndpointKind::Vision => validate_vision(&body).map(GatewayRequest::Vision),
        EndpointKind::Speech => validate_speech(&body).map(GatewayRequest::Speech),
    }
}

fn validate_chat(body: &Map<String, Value>) -> Result<ChatRequest, ValidationError> {
    let mut errors = ValidationError::default();

    let messages = match body.get("messages") {
        None | Some(Value::Null) => {
            errors.push("messages", "is required");
            Vec::new()
        }
        Some(Value::Array(items)) if items.is_empty() => {
            errors.push("messages", "must contain at least one message");
            Vec::new()
        }
        Some(Value::Array(items)) => parse_messages(items, &mut errors),
        Some(_) => {
            errors.push("messages", "must be an array");
            Vec::new()
        }
    };

    let request = ChatRequest {
        messages,
        model: optional_string(body, "model", &mut errors),
        conversation_id: optional_string(body, "conversationId", &mut errors),
        stream: optional_bool(body, "stream", &mut errors),
    };
    errors.into_result(request)
}

fn parse_messages(items: &[Value], errors: &mut ValidationError) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let Some(entry) = item.as_object() else {
            errors.push(format!("messages[{i}]"), "must be an object");
            continue;
        };

        let role = match entry.get("role") {
            Some(Value::String(raw)) => {
                let role = ChatRole::parse(raw);
                if role.is_none() {
                    errors.push(
                        format!("messages[{i}].role"),
                        "must be one of system, user, assistant",
                    );
                }
                role
            }
            None | Some(Value::Null) => {
                errors.push(format!("messages[{i}].role"), "is required");
                None
            }
            Some(_) => {
                errors.push(format!("messages[{i}].role"), "must be a string");
                None
            }
        };

        let content = match entry.get("content") {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            Some(Value::String(_)) => {
                errors.push(format!("messages[{i}].content"), "must not be empty");
                None
            }
            None | Some(Value::Null) => {
                errors.push(format!("messages[{i}].content"), "is required");
                None
            }
            Some(_) => {
                errors.push(format!("messages[{i}].content"), "must be a string");
                None
            }
        };

        if let (Some(role), Some(content)) = (role, content) {
            messages.push(ChatMessage::new(role, content));
        }
    }

    messages
}

fn validate_vision(body: &Map<String, Value>) -> Result<VisionRequest, ValidationError> {
    let mut errors = ValidationError::default();

    let request = VisionRequest {
        image_url: optional_http_url(body, "imageUrl", &mut errors),
        image_base64: optional_string(body, "imageBase64", &mut errors),
        prompt: optional_string(body, "prompt", &mut errors),
        model: optional_string(body, "model", &mut errors),
    };

    require_one_of(
        &mut errors,
        ("imageUrl", request.image_url.is_some()),
        ("imageBase64", request.image_base64.is_some()),
        EITHER_IMAGE,
    );
    errors.into_result(request)
}

fn validate_speech(body: &Map<String, Value>) -> Result<SpeechRequest, ValidationError> {
    let mut errors = ValidationError::default();

    let request = SpeechRequest {
        audio_url: optional_http_url(body, "audioUrl", &mut errors),
        audio_base64: optional_string(body, "audioBase64", &mut errors),
        language: optional_string(body, "language", &mut errors),
    };

    require_one_of(
        &mut errors,
        ("audioUrl", request.audio_url.is_some()),
        ("audioBase64", request.audio_base64.is_some()),
        EITHER_AUDIO,
    );
    errors.into_result(request)
}

/// Either/or rule. Skipped when one side already failed its own check,
/// so the caller sees the more specific reason.
fn require_one_of(
    errors: &mut ValidationError,
    (first, first_present): (&str, bool),
    (second, second_present): (&str, bool),
    rule: &str,
) {
    if first_present || second_present || errors.has(first) || errors.has(second) {
        return;
    }
    errors.push(first, rule);
    errors.push(second, rule);
}

/// Optional string field. Missing, `null` and `""` all count as absent.
fn optional_string(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut ValidationError,
) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            errors.push(field, "must be a string");
            None
        }
    }
}

fn optional_bool(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut ValidationError,
) -> Option<bool> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => {
            errors.push(field, "must be a boolean");
            None
        }
    }
}

fn optional_http_url(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut ValidationError,
) -> Option<String> {
    let raw = optional_string(body, field, errors)?;
    match url::Url::parse(&raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(raw),
        _ => {
            errors.push(field, "must be an absolute http(s) URL");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(body: &str) -> Result<GatewayRequest, ValidationError> {
        validate(EndpointKind::Chat, body.as_bytes())
    }

    #[test]
    fn test_chat_single_user_message_accepted() {
        let request = chat(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        let GatewayRequest::Chat(chat) = request else {
            panic!("expected chat request");
        };
        assert_eq!(chat.messages, vec![ChatMessage::new(ChatRole::User, "hi")]);
        assert_eq!(chat.stream, None);
    }

    #[test]
    fn test_chat_empty_messages_rejected() {
        let error = chat(r#"{"messages":[]}"#).unwrap_err();
        assert_eq!(error.code(), "bad_request");
        assert_eq!(
            error.details().get("messages").map(String::as_str),
            Some("must contain at least one message")
        );
    }

    #[test]
    fn test_chat_missing_messages_rejected() {
        let error = chat(r#"{"model":"m"}"#).unwrap_err();
        assert_eq!(
            error.details().get("messages").map(String::as_str),
            Some("is required")
        );
    }

    #[test]
    fn test_chat_reports_every_bad_entry() {
        let error = chat(
            r#"{"messages":[
                {"role":"user","content":"ok"},
                {"role":"tool","content":"x"},
                {"role":"assistant","content":""},
                "nope"
            ]}"#,
        )
        .unwrap_err();

        let details = error.details();
        assert_eq!(details.len(), 3);
        assert!(details.contains_key("messages[1].role"));
        assert!(details.contains_key("messages[2].content"));
        assert!(details.contains_key("messages[3]"));
    }

    #[test]
    fn test_chat_optional_fields_and_unknown_fields() {
        let request = chat(
            r#"{"messages":[{"role":"system","content":"s"},{"role":"user","content":"u"}],
                "model":"gpt-x","conversationId":"c1","stream":true,"temperature":0.3}"#,
        )
        .unwrap();

        assert!(request.wants_stream());
        let GatewayRequest::Chat(chat) = request else {
            panic!("expected chat request");
        };
        assert_eq!(chat.model.as_deref(), Some("gpt-x"));
        assert_eq!(chat.conversation_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_chat_type_mismatches() {
        let error = chat(r#"{"messages":[{"role":"user","content":"hi"}],"stream":"yes","model":3}"#)
            .unwrap_err();
        assert_eq!(error.details()["stream"], "must be a boolean");
        assert_eq!(error.details()["model"], "must be a string");
    }

    #[test]
    fn test_non_object_and_invalid_json_bodies() {
        assert!(chat("[]").unwrap_err().details().contains_key("body"));
        assert!(chat("{not json").unwrap_err().details().contains_key("body"));
        assert!(chat("").unwrap_err().details().contains_key("body"));
    }

    #[test]
    fn test_vision_requires_an_image_source() {
        let error = validate(EndpointKind::Vision, br#"{"prompt":"what is this?"}"#).unwrap_err();
        assert_eq!(error.details()["imageUrl"], EITHER_IMAGE);
        assert_eq!(error.details()["imageBase64"], EITHER_IMAGE);

        let error =
            validate(EndpointKind::Vision, br#"{"imageUrl":null,"imageBase64":""}"#).unwrap_err();
        assert!(error.details().contains_key("imageUrl"));
    }

    #[test]
    fn test_vision_url_accepted() {
        let request = validate(EndpointKind::Vision, br#"{"imageUrl":"https://x/y.png"}"#).unwrap();
        assert_eq!(
            request,
            GatewayRequest::Vision(VisionRequest {
                image_url: Some("https://x/y.png".into()),
                image_base64: None,
                prompt: None,
                model: None,
            })
        );
    }

    #[test]
    fn test_vision_rejects_non_http_url() {
        let error = validate(EndpointKind::Vision, br#"{"imageUrl":"file:///etc/passwd"}"#)
            .unwrap_err();
        assert_eq!(error.details().len(), 1);
        assert_eq!(error.details()["imageUrl"], "must be an absolute http(s) URL");
    }

    #[test]
    fn test_speech_either_or() {
        let error = validate(EndpointKind::Speech, br#"{"language":"en"}"#).unwrap_err();
        assert_eq!(error.details()["audioUrl"], EITHER_AUDIO);

        let request =
            validate(EndpointKind::Speech, br#"{"audioBase64":"UklGRg==","language":"en"}"#)
                .unwrap();
        assert_eq!(request.kind(), EndpointKind::Speech);
        assert!(!request.wants_stream());
    }

    #[test]
    fn test_display_lists_fields() {
        let error = chat(r#"{"messages":[]}"#).unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid request: messages must contain at least one message"
        );
    }
}
