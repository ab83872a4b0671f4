//! Capabilities the playback core consumes from the outside world.
//!
//! Each trait is one collaborator: the clip player, the on-demand clip
//! backend, the local speech engine, the dialogue generator and speech-to-text.

use async_trait::async_trait;

use crate::error::CouncilError;
use crate::persona::{PersonaId, Turn};

/// Plays remote clips. `play` completes when the clip ends.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    async fn play(&self, audio_ref: &str) -> Result<(), CouncilError>;

    /// Silence whatever clip is playing. A pending `play` returns early.
    fn stop(&self);
}

/// Renders a clip for one line on request and returns its reference.
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn request_clip(&self, speaker: PersonaId, text: &str) -> Result<String, CouncilError>;
}

/// Local fallback speech synthesis.
#[async_trait]
pub trait LocalSpeech: Send + Sync {
    /// Current voice catalog.
    fn voices(&self) -> Vec<String>;

    /// Speak `text`; completes when the utterance ends or is cancelled.
    async fn speak(&self, text: &str, voice: Option<&str>) -> Result<(), CouncilError>;

    fn cancel(&self);
}

/// Produces the ordered council dialogue for a user's challenge.
#[async_trait]
pub trait DialogueSource: Send + Sync {
    /// `turns` is advisory; sources may return more or fewer.
    async fn generate(&self, text: &str, turns: usize) -> Result<Vec<Turn>, CouncilError>;
}

/// One final transcript per recognition attempt.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self) -> Result<String, CouncilError>;
}
