//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CouncilError;
use crate::persona::PersonaId;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub playback: PlaybackConfig,
    pub council: CouncilSection,
    pub voices: VoicesConfig,
    pub prompts: PromptsConfig,
}

/// The dialogue/clip backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_base: String,
    /// Advisory turn count sent with each dialogue request.
    pub default_turns: usize,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            default_turns: 3,
            timeout_secs: 120,
            connect_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Direct OpenAI-compatible generation. Endpoint and key come from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 300,
        }
    }
}

/// Turn pacing and blob timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Hold before advancing past a turn nothing could voice.
    pub dwell_ms: u64,
    /// Estimated speaking time per character in blob mode.
    pub per_char_ms: u64,
    /// Pause added after every blob segment.
    pub pause_ms: u64,
    /// Local voice speed; 1.0 is natural.
    pub speech_rate: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1500,
            per_char_ms: 60,
            pause_ms: 800,
            speech_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CouncilSection {
    pub name: String,
}

impl Default for CouncilSection {
    fn default() -> Self {
        Self {
            name: "inner-triad".to_string(),
        }
    }
}

/// Voice preferences for the local speech engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub default_voice: Option<String>,
    /// Ordered preference list, keyed by persona name.
    pub preferences: HashMap<String, Vec<String>>,
}

impl VoicesConfig {
    /// Preference list for `persona`; keys match case-insensitively.
    pub fn preferences_for(&self, persona: PersonaId) -> &[String] {
        self.preferences
            .iter()
            .find(|(key, _)| key.parse::<PersonaId>().ok() == Some(persona))
            .map(|(_, voices)| voices.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for VoicesConfig {
    fn default() -> Self {
        let preferences = [
            (PersonaId::Intuition, &["af_bella", "af_sky"][..]),
            (PersonaId::Reason, &["bm_george", "am_adam"][..]),
            (PersonaId::Fear, &["af_nicole", "bf_emma"][..]),
            (PersonaId::Facts, &["am_michael", "bm_lewis"][..]),
            (PersonaId::Heart, &["bf_emma", "af_bella"][..]),
            (PersonaId::Caution, &["bm_lewis", "bm_george"][..]),
            (PersonaId::Optimist, &["af_sarah", "af_sky"][..]),
            (PersonaId::Creator, &["af_nova", "af_nicole"][..]),
            (PersonaId::Guide, &["am_adam", "am_michael"][..]),
        ]
        .into_iter()
        .map(|(persona, voices)| {
            (
                persona.label().to_lowercase(),
                voices.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect();

        Self {
            default_voice: Some("af_sky".to_string()),
            preferences,
        }
    }
}

/// System prompts for direct generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Per-persona overrides of the built-in prompt, keyed by persona name.
    pub personas: HashMap<String, String>,
    pub summary_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            personas: HashMap::new(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl PromptsConfig {
    /// The system prompt for `persona`, with `{name}` replaced.
    pub fn persona_prompt(&self, persona: PersonaId) -> String {
        let template = self
            .personas
            .iter()
            .find(|(key, _)| key.parse::<PersonaId>().ok() == Some(persona))
            .map(|(_, prompt)| prompt.as_str())
            .unwrap_or(DEFAULT_PERSONA_PROMPT);
        template
            .replace("{name}", persona.label())
            .replace("{stance}", default_stance(persona))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CouncilError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CouncilError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, CouncilError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CouncilError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.playback.dwell_ms == 0 {
            return Err(CouncilError::ConfigError(
                "playback.dwell_ms must be greater than zero".to_string(),
            ));
        }
        if self.playback.per_char_ms == 0 && self.playback.pause_ms == 0 {
            return Err(CouncilError::ConfigError(
                "playback.per_char_ms and playback.pause_ms cannot both be zero".to_string(),
            ));
        }
        for key in self.voices.preferences.keys().chain(self.prompts.personas.keys()) {
            key.parse::<PersonaId>()?;
        }
        if !(self.playback.speech_rate > 0.0) {
            return Err(CouncilError::ConfigError(
                "playback.speech_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

fn default_stance(persona: PersonaId) -> &'static str {
    match persona {
        PersonaId::Intuition => "You speak for the gut feeling: quick, warm, image-driven.",
        PersonaId::Reason => "You weigh options calmly and name trade-offs plainly.",
        PersonaId::Fear => "You voice the worries and risks, protective rather than panicked.",
        PersonaId::Facts => "You stick to what is known and what the numbers say.",
        PersonaId::Heart => "You speak for feelings, needs and values.",
        PersonaId::Caution => "You point out downsides and what could go wrong.",
        PersonaId::Optimist => "You find the upside and the opportunity.",
        PersonaId::Creator => "You offer new ideas and unexpected options.",
        PersonaId::Guide => "You moderate, summarize and suggest one next step.",
        PersonaId::User => "You are the person seeking advice.",
    }
}

const DEFAULT_PERSONA_PROMPT: &str = r#"You are {name}, one voice of a person's inner council.
{stance}

The person describes a challenge. Other council voices may already have spoken;
respond to them when it helps, but keep your own perspective.

SPEAKING STYLE:
- Short, natural sentences that sound good aloud
- Write numbers out in words
- Under eighty words
- Speak directly to the person as "you"

CRITICAL OUTPUT RULES:
- Output ONLY your spoken words
- Do NOT prefix your reply with your name or any label
- Do NOT use asterisks, markdown or stage directions
- Do not diagnose or give medical or crisis advice
"#;

const DEFAULT_SUMMARY_PROMPT: &str = r#"You turn an inner-council conversation into a Reset Card.
Output exactly three lines and nothing else:
Biggest tension: ...
Trade-off I'm accepting: ...
My 7-day commitment: ...
"#;
