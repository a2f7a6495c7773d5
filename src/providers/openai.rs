//! OpenAI-compatible chat completion and speech endpoints

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{check_status, http_client, CompletionRequest, ProviderError, SpeechService, TextGenerator, VoiceParams};
use crate::config::{SpeechSection, TextSection};

/// Chat-completions text generator
pub struct OpenAiText {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiText {
    pub fn new(api_key: impl Into<String>, section: &TextSection) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            api_base: section.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: section.model.clone(),
            temperature: section.temperature,
            max_tokens: section.max_tokens,
        })
    }

    /// Build from config, reading the key from the configured variable
    pub fn from_config(section: &TextSection) -> Result<Self, ProviderError> {
        let key = crate::config::secret_from_env(&section.api_key_env)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Self::new(key, section)
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if request.json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_chat_response(raw: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|e| ProviderError::Decode(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::Decode("completion has no content".to_string()))
}

#[async_trait]
impl TextGenerator for OpenAiText {
    fn name(&self) -> &'static str {
        "openai-chat"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await?;
        let raw = check_status("openai", response).await?.text().await?;
        debug!(bytes = raw.len(), "Completion received");
        parse_chat_response(&raw)
    }
}

/// Speech endpoint client
pub struct OpenAiSpeech {
    client: Client,
    api_base: String,
    api_key: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: impl Into<String>, section: &SpeechSection) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            api_base: section.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(section: &SpeechSection) -> Result<Self, ProviderError> {
        let key = crate::config::secret_from_env(&section.api_key_env)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Self::new(key, section)
    }
}

fn speech_body(text: &str, voice: &VoiceParams) -> serde_json::Value {
    json!({
        "model": voice.model,
        "voice": voice.voice,
        "input": text,
        "speed": voice.speed,
        "response_format": voice.format,
    })
}

#[async_trait]
impl SpeechService for OpenAiSpeech {
    fn name(&self) -> &'static str {
        "openai-tts"
    }

    #[instrument(skip(self, text), fields(chars = text.len(), voice = %voice.voice))]
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Bytes, ProviderError> {
        let url = format!("{}/audio/speech", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&speech_body(text, voice))
            .send()
            .await?;
        let audio = check_status("openai", response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::Decode("empty audio payload".to_string()));
        }
        Ok(audio)
    }
}
