//! Direct dialogue generation against an OpenAI-compatible chat API.
//!
//! Each council member gets its own system prompt and sees the user's
//! challenge plus everything said before it.

use std::sync::LazyLock;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Config, PromptsConfig};
use crate::council::Council;
use crate::error::CouncilError;
use crate::persona::{PersonaId, Turn};
use crate::speech::DialogueSource;

const MAX_EMPTY_RETRIES: u32 = 3;

/// Where and how to reach the chat API.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl LlmSettings {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, config: &Config) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: config.llm.model.clone(),
            max_tokens: config.llm.max_tokens,
            max_retries: config.backend.max_retries.max(1),
            timeout: Duration::from_secs(config.backend.timeout_secs),
            connect_timeout: Duration::from_secs(config.backend.connect_timeout_secs),
        }
    }
}

/// Generates council turns one persona at a time.
pub struct LlmDialogueSource {
    client: Client<OpenAIConfig>,
    settings: LlmSettings,
    members: Vec<PersonaId>,
    prompts: PromptsConfig,
}

impl LlmDialogueSource {
    pub fn new(
        settings: LlmSettings,
        council: &dyn Council,
        prompts: PromptsConfig,
    ) -> Result<Self, CouncilError> {
        let members = council.members().to_vec();
        if members.is_empty() {
            return Err(CouncilError::ConfigError(format!(
                "Council '{}' has no members",
                council.name()
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| {
                CouncilError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            settings,
            members,
            prompts,
        })
    }

    /// Condense a finished conversation into a three-line reset card.
    pub async fn reset_card(&self, turns: &[Turn]) -> Result<String, CouncilError> {
        if turns.is_empty() {
            return Err(CouncilError::GenerationRequest(
                "Nothing to summarize".to_string(),
            ));
        }
        let messages = vec![
            system_message(&self.prompts.summary_prompt),
            user_message(format_transcript(turns)),
        ];
        let raw = self.complete_non_empty("reset card", messages).await?;
        Ok(clean_card(&raw))
    }

    async fn complete_non_empty(
        &self,
        who: &str,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, CouncilError> {
        for attempt in 0..MAX_EMPTY_RETRIES {
            let response = self.get_completion(messages.clone()).await?;
            if !sanitize_response(&response).is_empty() {
                return Ok(response);
            }
            if attempt < MAX_EMPTY_RETRIES - 1 {
                warn!(who, attempt = attempt + 1, "empty response, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        Err(CouncilError::GenerationRequest(format!(
            "{} returned an empty response after {} attempts",
            who, MAX_EMPTY_RETRIES
        )))
    }

    /// One chat completion, retried with exponential backoff.
    async fn get_completion(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, CouncilError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .max_completion_tokens(self.settings.max_tokens)
            .messages(messages)
            .build()?;

        let mut last_error = None;
        for attempt in 0..self.settings.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    return Ok(response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default());
                }
                Err(e) => {
                    debug!(attempt, error = %e, "chat completion failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(CouncilError::from).unwrap_or_else(|| {
            CouncilError::GenerationRequest("Unknown API error after retries".to_string())
        }))
    }
}

#[async_trait]
impl DialogueSource for LlmDialogueSource {
    async fn generate(&self, text: &str, turns: usize) -> Result<Vec<Turn>, CouncilError> {
        let mut dialogue: Vec<Turn> = Vec::with_capacity(turns);

        for index in 0..turns {
            let speaker = speaker_for(&self.members, index);
            let mut messages = vec![system_message(&self.prompts.persona_prompt(speaker))];
            messages.extend(context_lines(text, &dialogue).into_iter().map(user_message));

            let response = self.complete_non_empty(speaker.label(), messages).await?;
            let line = sanitize_response(&response);
            debug!(%speaker, chars = line.len(), "council line generated");
            dialogue.push(Turn::new(speaker, line));
        }

        Ok(dialogue)
    }
}

/// Exponential backoff: 1s, 2s, 4s.
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(6))
}

fn speaker_for(members: &[PersonaId], index: usize) -> PersonaId {
    members[index % members.len()]
}

/// The user's challenge, then every earlier line attributed to its speaker.
fn context_lines(text: &str, previous: &[Turn]) -> Vec<String> {
    std::iter::once(format!("My challenge: {}", text.trim()))
        .chain(
            previous
                .iter()
                .map(|turn| format!("[{} said]: {}", turn.speaker.label(), turn.text)),
        )
        .collect()
}

fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: content.to_string().into(),
        name: None,
    })
}

fn user_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: content.into(),
        name: None,
    })
}

const REASONING_TAGS: [&str; 15] = [
    "thinking",
    "think",
    "reflection",
    "reflect",
    "internal",
    "reasoning",
    "thought",
    "scratch",
    "scratchpad",
    "plan",
    "analysis",
    "analyze",
    "consider",
    "pondering",
    "deliberation",
];

static REASONING_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REASONING_TAGS
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
        .collect()
});

static ORPHAN_TAGS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?\w+[^>]*>").ok());

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

fn strip_markup(response: &str) -> String {
    let mut result = response.to_string();
    for block in REASONING_BLOCKS.iter() {
        result = block.replace_all(&result, "").into_owned();
    }
    if let Some(orphans) = ORPHAN_TAGS.as_ref() {
        result = orphans.replace_all(&result, "").into_owned();
    }
    result.replace('*', "")
}

/// Strip reasoning blocks, stray tags and emphasis; collapse whitespace.
pub fn sanitize_response(response: &str) -> String {
    let result = strip_markup(response);
    match WHITESPACE.as_ref() {
        Some(ws) => ws.replace_all(&result, " ").trim().to_string(),
        None => result.trim().to_string(),
    }
}

/// Like [`sanitize_response`] but keeps one card line per line.
fn clean_card(response: &str) -> String {
    strip_markup(response)
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '•']).trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
