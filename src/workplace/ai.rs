//! OpenAI-backed generation: coworker standups, voices, transcription and
//! code review.
//!
//! [`build_provider`] picks [`OpenAiClient`] when an API key is configured
//! and [`OfflineAi`] otherwise, so every feature keeps answering without
//! network access.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::models::ReviewFeedback;
use crate::config::OpenAiSection;
use crate::errors::WorkplaceError;

pub const DEFAULT_VOICE: &str = "alloy";

/// Map a coworker name onto an OpenAI TTS voice.
pub fn voice_for(name: &str) -> &'static str {
    match name {
        "Sarah" => "nova",
        "Mike" => "onyx",
        "Alex" => "echo",
        "Emily" => "shimmer",
        "David" => "fable",
        _ => DEFAULT_VOICE,
    }
}

pub fn coworker_prompt(name: &str, role: &str, context: &str) -> String {
    format!(
        "Act as {name}, a {role} at a tech startup. Give a very short (1-2 sentences) daily standup update.\n\
         Context: {context}.\n\
         Tone: Casual, slightly tired but professional."
    )
}

pub fn review_prompt(diff: &str, pr_title: &str) -> String {
    format!(
        "Act as a senior software engineer. Review the following code diff and provide constructive feedback.\n\
         Return the response as a JSON object with a key \"comments\", which is a list of objects containing \"file\", \"line\", and \"message\".\n\
         IMPORTANT: The \"file\" must be the filename as seen in the diff. The \"line\" must be the line number in the new file (right side of diff).\n\
         \n\
         PR Title: {pr_title}\n\
         \n\
         Diff:\n\
         {diff}"
    )
}

/// Parse the model's JSON answer into review feedback.
pub fn parse_review(content: &str) -> Result<ReviewFeedback, WorkplaceError> {
    serde_json::from_str(content)
        .map_err(|e| WorkplaceError::OpenAi(format!("Malformed review JSON: {}", e)))
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// A one or two sentence standup update spoken as `name`.
    async fn coworker_update(
        &self,
        name: &str,
        role: &str,
        context: &str,
    ) -> Result<String, WorkplaceError>;

    /// MP3 audio of `text` in the voice assigned to `name`. Empty when no
    /// audio could be produced.
    async fn synthesize_voice(&self, text: &str, name: &str) -> Result<Vec<u8>, WorkplaceError>;

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, WorkplaceError>;

    async fn review_diff(&self, diff: &str, pr_title: &str)
    -> Result<ReviewFeedback, WorkplaceError>;
}

pub fn build_provider(config: &OpenAiSection) -> Arc<dyn AiProvider> {
    match &config.api_key {
        Some(key) => Arc::new(OpenAiClient::new(config, key)),
        None => Arc::new(OfflineAi),
    }
}

/// Canned answers used when no OpenAI key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAi;

pub const OFFLINE_TRANSCRIPT: &str = "Mock transcription: I worked on the login feature.";

#[async_trait]
impl AiProvider for OfflineAi {
    async fn coworker_update(
        &self,
        _name: &str,
        _role: &str,
        context: &str,
    ) -> Result<String, WorkplaceError> {
        Ok(format!("I am working on {}. No blockers.", context))
    }

    async fn synthesize_voice(&self, _text: &str, _name: &str) -> Result<Vec<u8>, WorkplaceError> {
        Ok(Vec::new())
    }

    async fn transcribe(&self, _audio: Vec<u8>, _filename: &str) -> Result<String, WorkplaceError> {
        Ok(OFFLINE_TRANSCRIPT.to_string())
    }

    async fn review_diff(
        &self,
        _diff: &str,
        _pr_title: &str,
    ) -> Result<ReviewFeedback, WorkplaceError> {
        Ok(ReviewFeedback::default())
    }
}

// ── OpenAI wire types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for the OpenAI REST API.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    speech_model: String,
    transcription_model: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiSection, api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            speech_model: config.speech_model.clone(),
            transcription_model: config.transcription_model.clone(),
        }
    }

    async fn chat(&self, prompt: String, json: bool) -> Result<String, WorkplaceError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt),
            }],
            response_format: json.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkplaceError::OpenAi(format!("{}: {}", status, error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WorkplaceError::OpenAi("No choices in chat response".to_string()))
    }

    async fn speech(&self, text: &str, voice: &str) -> Result<Vec<u8>, WorkplaceError> {
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.speech_model,
                voice,
                input: text,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn coworker_update(
        &self,
        name: &str,
        role: &str,
        context: &str,
    ) -> Result<String, WorkplaceError> {
        let text = self.chat(coworker_prompt(name, role, context), false).await?;
        Ok(text.trim().to_string())
    }

    async fn synthesize_voice(&self, text: &str, name: &str) -> Result<Vec<u8>, WorkplaceError> {
        match self.speech(text, voice_for(name)).await {
            Ok(audio) => Ok(audio),
            Err(e) => {
                tracing::warn!(error = %e, coworker = name, "Voice generation failed");
                Ok(Vec::new())
            }
        }
    }

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, WorkplaceError> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| WorkplaceError::OpenAi(e.to_string()))?;
        Ok(body.text)
    }

    async fn review_diff(
        &self,
        diff: &str,
        pr_title: &str,
    ) -> Result<ReviewFeedback, WorkplaceError> {
        let content = self.chat(review_prompt(diff, pr_title), true).await?;
        parse_review(&content)
    }
}
