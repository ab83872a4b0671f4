//! Error types for the council playback system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CouncilError {
    /// No remote clip reference, or the on-demand fetch failed.
    #[error("Audio source unavailable: {0}")]
    SourceUnavailable(String),

    /// A resolved clip reference errored while playing.
    #[error("Playback failed: {0}")]
    PlaybackFailure(String),

    /// The local speech engine is missing or refused the utterance.
    #[error("Speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("Dialogue request failed: {0}")]
    GenerationRequest(String),

    #[error("Voice session failed to start: {0}")]
    SessionStart(String),

    #[error("Playback loop has shut down")]
    PlaybackClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown council: {0}")]
    UnknownCouncil(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
