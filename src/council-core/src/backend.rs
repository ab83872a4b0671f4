//! HTTP client for the council backend.
//!
//! `/api/podcast` turns a challenge into a scripted dialogue, `/api/tts`
//! renders one line on demand.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::CouncilError;
use crate::generation::backoff;
use crate::persona::{PersonaId, Turn};
use crate::speech::{ClipSource, DialogueSource};

#[derive(Debug, Serialize)]
struct DialogueRequest<'a> {
    text: &'a str,
    turns: usize,
}

#[derive(Debug, Deserialize)]
struct DialogueResponse {
    #[serde(default)]
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct ClipRequest<'a> {
    speaker: PersonaId,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClipResponse {
    #[serde(default, alias = "audioUrl")]
    audio_url: String,
}

pub struct CouncilBackend {
    client: reqwest::Client,
    api_base: String,
    max_retries: u32,
}

impl CouncilBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, CouncilError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                CouncilError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_retries: config.max_retries.max(1),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Absolute URL for a clip reference.
    pub fn clip_url(&self, audio_ref: &str) -> String {
        resolve_clip_url(&self.api_base, audio_ref)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CouncilError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.api_base, path);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let sent = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            match sent {
                Ok(response) => return Ok(response.json::<R>().await?),
                Err(e) => {
                    debug!(%url, attempt, error = %e, "backend request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(CouncilError::from).unwrap_or_else(|| {
            CouncilError::SourceUnavailable(format!("No response from {}", url))
        }))
    }
}

#[async_trait]
impl DialogueSource for CouncilBackend {
    async fn generate(&self, text: &str, turns: usize) -> Result<Vec<Turn>, CouncilError> {
        let response: DialogueResponse = self
            .post_json("/api/podcast", &DialogueRequest { text, turns })
            .await
            .map_err(|e| CouncilError::GenerationRequest(e.to_string()))?;
        debug!(turns = response.turns.len(), "dialogue received");
        Ok(response.turns)
    }
}

#[async_trait]
impl ClipSource for CouncilBackend {
    async fn request_clip(&self, speaker: PersonaId, text: &str) -> Result<String, CouncilError> {
        let request = ClipRequest { speaker, text };
        let response: ClipResponse = self
            .post_json("/api/tts", &request)
            .await
            .map_err(|e| CouncilError::SourceUnavailable(e.to_string()))?;

        let audio_ref = response.audio_url.trim();
        if audio_ref.is_empty() {
            return Err(CouncilError::SourceUnavailable(
                "backend returned no audio_url".to_string(),
            ));
        }
        Ok(audio_ref.to_string())
    }
}

/// Join a relative reference onto `api_base`; absolute URLs pass through.
pub fn resolve_clip_url(api_base: &str, audio_ref: &str) -> String {
    let audio_ref = audio_ref.trim();
    if audio_ref.starts_with("http://") || audio_ref.starts_with("https://") {
        return audio_ref.to_string();
    }
    format!(
        "{}/{}",
        api_base.trim_end_matches('/'),
        audio_ref.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_clip_url() {
        assert_eq!(
            resolve_clip_url("http://127.0.0.1:8000/", "/audio/1.mp3"),
            "http://127.0.0.1:8000/audio/1.mp3"
        );
        assert_eq!(
            resolve_clip_url("http://127.0.0.1:8000", "audio/1.mp3"),
            "http://127.0.0.1:8000/audio/1.mp3"
        );
        assert_eq!(
            resolve_clip_url("http://127.0.0.1:8000", "https://cdn.example/x.mp3"),
            "https://cdn.example/x.mp3"
        );
    }

    #[test]
    fn test_parse_dialogue_response() {
        let body = r#"{"turns":[
            {"speaker":"intuition","text":"I feel torn","audio_url":"/a.mp3"},
            {"speaker":"reason","text":"Let's weigh the options","audio_url":""},
            {"speaker":"fear","text":"What if?"}
        ]}"#;
        let response: DialogueResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.turns.len(), 3);
        assert_eq!(response.turns[0].speaker, PersonaId::Intuition);
        assert_eq!(response.turns[0].audio_ref(), Some("/a.mp3"));
        assert_eq!(response.turns[1].audio_ref(), None);
        assert_eq!(response.turns[2].audio_ref(), None);
    }

    #[test]
    fn test_missing_turns_is_empty() {
        let response: DialogueResponse = serde_json::from_str("{}").unwrap();
        assert!(response.turns.is_empty());
    }

    #[test]
    fn test_clip_request_body() {
        let body = serde_json::to_value(ClipRequest {
            speaker: PersonaId::Heart,
            text: "I feel hopeful.",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"speaker": "Heart", "text": "I feel hopeful."})
        );
    }

    #[test]
    fn test_backend_trims_base() {
        let backend = CouncilBackend::new(&BackendConfig {
            api_base: "http://localhost:8000/".to_string(),
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(backend.api_base(), "http://localhost:8000");
        assert_eq!(backend.clip_url("/x.wav"), "http://localhost:8000/x.wav");
    }
}
