//! Council Core Library
//!
//! Plays a multi-persona "inner council" conversation: sequences turns
//! through remote clips or local speech, splits streamed agent messages into
//! persona segments and keeps the speaking highlight in step with the audio.

pub mod agent;
pub mod backend;
pub mod clip;
pub mod config;
pub mod council;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod persona;
pub mod resolver;
pub mod segmenter;
pub mod speech;
pub mod timing;
pub mod tts;
pub mod voice;

#[cfg(test)]
mod testing;

pub use agent::{AgentEvent, AgentMode, MessageSource};
pub use backend::CouncilBackend;
pub use clip::HttpClipPlayer;
pub use config::Config;
pub use council::{Council, InnerTriad, SixVoices};
pub use error::CouncilError;
pub use generation::{LlmDialogueSource, LlmSettings};
pub use orchestrator::{
    CouncilCallback, CouncilEvent, OrchestratorHandle, PlaybackOrchestrator, PlaybackState,
};
pub use persona::{PersonaId, Turn};
pub use resolver::SpeechResolver;
pub use segmenter::{PersonaSegmenter, Segment};
pub use speech::{ClipPlayer, ClipSource, DialogueSource, LocalSpeech, Transcriber};
pub use timing::DurationEstimator;
pub use tts::KokoroSpeech;
