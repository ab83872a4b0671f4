//! Persona identities and dialogue turns.
//!
//! A turn is one persona speaking one piece of text, optionally with a
//! pre-rendered remote clip.

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;

use crate::error::CouncilError;

/// Every persona any council deployment can field, plus the listener.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PersonaId {
    Intuition,
    Reason,
    Fear,
    Facts,
    Heart,
    Caution,
    Optimist,
    Creator,
    Guide,
    /// The person talking to the council.
    User,
}

impl PersonaId {
    pub const ALL: [PersonaId; 10] = [
        PersonaId::Intuition,
        PersonaId::Reason,
        PersonaId::Fear,
        PersonaId::Facts,
        PersonaId::Heart,
        PersonaId::Caution,
        PersonaId::Optimist,
        PersonaId::Creator,
        PersonaId::Guide,
        PersonaId::User,
    ];

    /// Label used in captions and as a spoken-blob marker.
    pub fn label(&self) -> &'static str {
        match self {
            PersonaId::Intuition => "Intuition",
            PersonaId::Reason => "Reason",
            PersonaId::Fear => "Fear",
            PersonaId::Facts => "Facts",
            PersonaId::Heart => "Heart",
            PersonaId::Caution => "Caution",
            PersonaId::Optimist => "Optimist",
            PersonaId::Creator => "Creator",
            PersonaId::Guide => "Guide",
            PersonaId::User => "You",
        }
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PersonaId {
    type Err = CouncilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("user") {
            return Ok(PersonaId::User);
        }
        PersonaId::ALL
            .iter()
            .copied()
            .find(|p| p.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CouncilError::ConfigError(format!("Unknown persona: {}", s)))
    }
}

// Speakers arrive in whatever case the backend or model produced.
impl<'de> Deserialize<'de> for PersonaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| de::Error::custom(format!("unknown persona `{}`", raw)))
    }
}

/// One spoken line of the council dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub speaker: PersonaId,
    pub text: String,
    /// Remote clip reference, relative to the backend or absolute.
    #[serde(
        default,
        rename = "audio_url",
        alias = "audioRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_ref: Option<String>,
}

impl Turn {
    pub fn new(speaker: PersonaId, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            audio_ref: None,
        }
    }

    /// Attach a pre-rendered clip.
    pub fn with_audio(mut self, audio_ref: impl Into<String>) -> Self {
        self.audio_ref = Some(audio_ref.into());
        self
    }

    /// The clip reference, if one is set and non-blank.
    pub fn audio_ref(&self) -> Option<&str> {
        self.audio_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Remember a clip fetched on demand. An existing reference is kept.
    pub fn cache_audio_ref(&mut self, audio_ref: impl Into<String>) {
        if self.audio_ref().is_none() {
            self.audio_ref = Some(audio_ref.into());
        }
    }
}
