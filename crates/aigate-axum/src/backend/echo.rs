//! Deterministic development backend.
//!
//! Answers without any model: chat echoes the last user message (word by
//! word when streaming), vision and speech describe what they received.
//! Useful for exercising clients and the gateway pipeline locally.

use std::time::Duration;

use aigate_core::{GatewayRequest, InferenceBackend, InferenceError, InferenceOutput};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};

#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    /// Pause before each streamed word.
    word_delay: Duration,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_word_delay(mut self, delay: Duration) -> Self {
        self.word_delay = delay;
        self
    }

    fn answer(request: &GatewayRequest) -> String {
        match request {
            GatewayRequest::Chat(chat) => chat.last_user_message().unwrap_or_default().to_string(),
            GatewayRequest::Vision(vision) => {
                let source = vision.image_url.as_deref().map_or_else(
                    || {
                        let len = vision.image_base64.as_deref().map_or(0, str::len);
                        format!("an inline image ({len} base64 chars)")
                    },
                    |url| format!("an image at {url}"),
                );
                match vision.prompt.as_deref() {
                    Some(prompt) => format!("Received {source} with prompt: {prompt}"),
                    None => format!("Received {source}"),
                }
            }
            GatewayRequest::Speech(speech) => {
                let language = speech.language.as_deref().unwrap_or("auto");
                match speech.audio_url.as_deref() {
                    Some(url) => format!("Transcript of {url} (language: {language})"),
                    None => format!("Transcript of inline audio (language: {language})"),
                }
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for EchoBackend {
    async fn invoke(
        &self,
        request: &GatewayRequest,
        stream: bool,
    ) -> Result<InferenceOutput, InferenceError> {
        let text = Self::answer(request);
        if !stream {
            return Ok(InferenceOutput::Complete(text));
        }

        let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
        let delay = self.word_delay;
        let deltas = stream::iter(words).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(word)
        });
        Ok(InferenceOutput::Stream(deltas.boxed()))
    }
}
