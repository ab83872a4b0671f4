//! Scripted in-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CouncilError;
use crate::persona::PersonaId;
use crate::speech::{ClipPlayer, ClipSource, LocalSpeech};

/// Holds for each clip's scripted length; unknown or broken clips error.
#[derive(Default)]
pub struct ScriptedPlayer {
    clips: HashMap<String, Option<Duration>>,
    played: Mutex<Vec<String>>,
    stops: AtomicUsize,
    current: Mutex<CancellationToken>,
}

impl ScriptedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, audio_ref: &str, length: Duration) -> Self {
        self.clips.insert(audio_ref.to_string(), Some(length));
        self
    }

    pub fn with_broken(mut self, audio_ref: &str) -> Self {
        self.clips.insert(audio_ref.to_string(), None);
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipPlayer for ScriptedPlayer {
    async fn play(&self, audio_ref: &str) -> Result<(), CouncilError> {
        self.played.lock().unwrap().push(audio_ref.to_string());
        let Some(Some(length)) = self.clips.get(audio_ref).copied() else {
            return Err(CouncilError::PlaybackFailure(format!("cannot play {}", audio_ref)));
        };
        let token = {
            let mut current = self.current.lock().unwrap();
            *current = CancellationToken::new();
            current.clone()
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(length) => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().cancel();
    }
}

/// Answers every clip request with the same reference, or fails.
pub struct ScriptedClips {
    reply: Option<String>,
    requests: Mutex<Vec<(PersonaId, String)>>,
}

impl ScriptedClips {
    pub fn replying(audio_ref: &str) -> Self {
        Self {
            reply: Some(audio_ref.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(PersonaId, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipSource for ScriptedClips {
    async fn request_clip(&self, speaker: PersonaId, text: &str) -> Result<String, CouncilError> {
        self.requests.lock().unwrap().push((speaker, text.to_string()));
        self.reply
            .clone()
            .ok_or_else(|| CouncilError::SourceUnavailable("scripted failure".to_string()))
    }
}

/// Speaks every utterance for a fixed length.
pub struct ScriptedSpeech {
    length: Duration,
    fail: bool,
    catalog: Vec<String>,
    spoken: Mutex<Vec<(String, Option<String>)>>,
    cancels: AtomicUsize,
}

impl ScriptedSpeech {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            fail: false,
            catalog: Vec::new(),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn with_catalog(mut self, voices: &[&str]) -> Self {
        self.catalog = voices.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn spoken(&self) -> Vec<(String, Option<String>)> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalSpeech for ScriptedSpeech {
    fn voices(&self) -> Vec<String> {
        self.catalog.clone()
    }

    async fn speak(&self, text: &str, voice: Option<&str>) -> Result<(), CouncilError> {
        if self.fail {
            return Err(CouncilError::SynthesisUnavailable("scripted failure".to_string()));
        }
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), voice.map(str::to_string)));
        tokio::time::sleep(self.length).await;
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
