//! OpenAI-compatible upstream backend.
//!
//! Talks to any server exposing the OpenAI HTTP API (llama-server, vLLM,
//! the hosted API):
//!
//! - chat → `POST {base}/v1/chat/completions`, SSE when streaming
//! - vision → the same endpoint with a multimodal user message
//! - speech → `POST {base}/v1/audio/transcriptions` (multipart)
//!
//! Media referenced by URL (`audioUrl`) is downloaded with a separate
//! client that never carries the upstream API key, is capped at
//! `max_media_bytes`, and refuses link-local targets such as cloud
//! metadata endpoints, including via redirects.

use aigate_core::{
    ChatRequest, GatewayRequest, InferenceBackend, InferenceError, InferenceOutput, SpeechRequest,
    VisionRequest,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde_json::{Value, json};
use tracing::debug;
use url::Host;

use super::sse::sse_deltas;

/// Prompt used when a vision request carries none.
const DEFAULT_VISION_PROMPT: &str = "Describe this image.";

/// Upstream error bodies are truncated to this many bytes in logs.
const MAX_ERROR_BODY: usize = 512;

/// Default ceiling for downloaded media, matching the request body limit.
pub const DEFAULT_MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

const MAX_MEDIA_REDIRECTS: usize = 5;

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Server root, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub vision_model: String,
    pub speech_model: String,
    /// Largest media file fetched from a caller-supplied URL.
    pub max_media_bytes: usize,
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            chat_model: "default".to_string(),
            vision_model: "default".to_string(),
            speech_model: "whisper-1".to_string(),
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }
}

pub struct OpenAiCompatBackend {
    client: Client,
    /// Unauthenticated client for caller-supplied URLs.
    media_client: Client,
    config: OpenAiConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .build()
            .map_err(|e| InferenceError::Connect(format!("failed to build HTTP client: {e}")))?;
        let media_client = Client::builder()
            .redirect(Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_MEDIA_REDIRECTS {
                    attempt.error("too many redirects")
                } else if is_blocked_media_host(attempt.url()) {
                    attempt.error("redirect to a disallowed host")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(|e| InferenceError::Connect(format!("failed to build media client: {e}")))?;
        Ok(Self {
            client,
            media_client,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, InferenceError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| InferenceError::Connect(e.to_string()))?;
        check_status(response).await
    }

    async fn chat(&self, chat: &ChatRequest, stream: bool) -> Result<InferenceOutput, InferenceError> {
        let model = chat.model.as_deref().unwrap_or(&self.config.chat_model);
        let body = json!({
            "model": model,
            "messages": chat.messages,
            "stream": stream,
        });
        debug!(model, stream, messages = chat.messages.len(), "Forwarding chat completion");

        let response = self
            .send(self.client.post(self.url("/v1/chat/completions")).json(&body))
            .await?;

        if stream {
            Ok(InferenceOutput::Stream(sse_deltas(response.bytes_stream())))
        } else {
            let completion: Value = response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
            message_content(&completion).map(InferenceOutput::Complete)
        }
    }

    async fn vision(&self, vision: &VisionRequest) -> Result<InferenceOutput, InferenceError> {
        let image_url = match (&vision.image_url, &vision.image_base64) {
            (Some(url), _) => url.clone(),
            (None, Some(data)) => image_data_url(data),
            (None, None) => {
                return Err(InferenceError::Unsupported("vision request without an image".into()));
            }
        };
        let model = vision.model.as_deref().unwrap_or(&self.config.vision_model);
        let prompt = vision.prompt.as_deref().unwrap_or(DEFAULT_VISION_PROMPT);

        let body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } },
                ],
            }],
            "stream": false,
        });
        debug!(model, "Forwarding vision completion");

        let completion: Value = self
            .send(self.client.post(self.url("/v1/chat/completions")).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        message_content(&completion).map(InferenceOutput::Complete)
    }

    async fn speech(&self, speech: &SpeechRequest) -> Result<InferenceOutput, InferenceError> {
        let audio = match (&speech.audio_url, &speech.audio_base64) {
            (_, Some(data)) => decode_base64_payload(data)?,
            (Some(url), None) => self.fetch_media(url).await?,
            (None, None) => {
                return Err(InferenceError::Unsupported("speech request without audio".into()));
            }
        };
        debug!(bytes = audio.len(), "Forwarding transcription");

        let mut form = Form::new()
            .text("model", self.config.speech_model.clone())
            .part("file", Part::bytes(audio).file_name("audio"));
        if let Some(language) = &speech.language {
            form = form.text("language", language.clone());
        }

        let transcription: Value = self
            .send(self.client.post(self.url("/v1/audio/transcriptions")).multipart(form))
            .await?
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        transcription["text"]
            .as_str()
            .map(|text| InferenceOutput::Complete(text.trim().to_string()))
            .ok_or_else(|| InferenceError::InvalidResponse("transcription without text".into()))
    }

    /// Download caller-supplied media without the upstream credential.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, InferenceError> {
        let url = Url::parse(url)
            .map_err(|e| InferenceError::Unsupported(format!("invalid media URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || is_blocked_media_host(&url) {
            return Err(InferenceError::Unsupported(format!(
                "media URL not allowed: {}",
                url.host_str().unwrap_or("")
            )));
        }

        let response = self
            .media_client
            .get(url)
            .send()
            .await
            .map_err(|e| InferenceError::Connect(format!("media download failed: {e}")))?;
        let response = check_status(response).await?;

        let limit = self.config.max_media_bytes;
        let too_large = || InferenceError::Unsupported(format!("media exceeds {limit} bytes"));
        if response
            .content_length()
            .is_some_and(|len| len > u64::try_from(limit).unwrap_or(u64::MAX))
        {
            return Err(too_large());
        }

        let mut body = std::pin::pin!(response.bytes_stream());
        let mut media = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| InferenceError::Connect(format!("media download failed: {e}")))?;
            if media.len() + chunk.len() > limit {
                return Err(too_large());
            }
            media.extend_from_slice(&chunk);
        }
        Ok(media)
    }
}

#[async_trait]
impl InferenceBackend for OpenAiCompatBackend {
    async fn invoke(
        &self,
        request: &GatewayRequest,
        stream: bool,
    ) -> Result<InferenceOutput, InferenceError> {
        match request {
            GatewayRequest::Chat(chat) => self.chat(chat, stream).await,
            GatewayRequest::Vision(vision) => self.vision(vision).await,
            GatewayRequest::Speech(speech) => self.speech(speech).await,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(InferenceError::Status {
        status: status.as_u16(),
        body,
    })
}

fn message_content(completion: &Value) -> Result<String, InferenceError> {
    completion["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| InferenceError::InvalidResponse("completion without message content".into()))
}

/// Strip an optional `data:...;base64,` prefix and decode.
fn decode_base64_payload(data: &str) -> Result<Vec<u8>, InferenceError> {
    let payload = data.split_once(";base64,").map_or(data, |(_, rest)| rest);
    STANDARD
        .decode(payload.trim())
        .map_err(|e| InferenceError::Unsupported(format!("invalid base64 payload: {e}")))
}

/// Build a data URL for an inline image, sniffing the format from its header.
fn image_data_url(data: &str) -> String {
    if data.starts_with("data:") {
        return data.to_string();
    }

    let head: String = data.chars().take(16).collect();
    let mime = match STANDARD.decode(head.as_bytes()).as_deref() {
        Ok([0x89, b'P', b'N', b'G', ..]) => "image/png",
        Ok([b'G', b'I', b'F', b'8', ..]) => "image/gif",
        Ok([b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..]) => "image/webp",
        _ => "image/jpeg",
    };
    format!("data:{mime};base64,{data}")
}

/// Link-local and unspecified addresses (cloud metadata services among
/// them) are never fetched on a caller's behalf. Only literal IPs are
/// checked; hostnames are resolved by the HTTP client.
fn is_blocked_media_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_link_local() || ip.is_unspecified() || ip.is_broadcast(),
        Some(Host::Ipv6(ip)) => {
            ip.is_unspecified()
                || (ip.segments()[0] & 0xffc0) == 0xfe80
                || ip
                    .to_ipv4_mapped()
                    .is_some_and(|v4| v4.is_link_local() || v4.is_unspecified())
        }
        Some(Host::Domain(_)) => false,
        None => true,
    }
}
