//! Decides how one turn gets voiced.
//!
//! Priority: the turn's own clip, then a clip rendered on demand, then the
//! local speech engine. When nothing can speak, the turn still completes
//! after a fixed dwell so playback keeps moving.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::config::VoicesConfig;
use crate::error::CouncilError;
use crate::persona::{PersonaId, Turn};
use crate::speech::{ClipPlayer, ClipSource, LocalSpeech};
use crate::voice::VoiceSelector;

/// Where the audio for a played turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechSource {
    /// The clip the turn arrived with.
    CachedClip,
    /// A clip requested for this turn.
    FetchedClip,
    /// The local speech engine.
    LocalVoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Played(SpeechSource),
    /// Nothing could voice the turn; the dwell has elapsed.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub resolution: Resolution,
    /// Clip reference fetched during this call, for the caller to cache.
    pub fetched_ref: Option<String>,
}

impl ResolveOutcome {
    fn new(resolution: Resolution, fetched_ref: Option<String>) -> Self {
        Self {
            resolution,
            fetched_ref,
        }
    }
}

/// Plays turns through whichever collaborators are available.
pub struct SpeechResolver {
    player: Option<Arc<dyn ClipPlayer>>,
    clips: Option<Arc<dyn ClipSource>>,
    local: Option<Arc<dyn LocalSpeech>>,
    voices: RwLock<VoiceSelector>,
    dwell: Duration,
}

impl SpeechResolver {
    pub fn new(voices: VoicesConfig, dwell: Duration) -> Self {
        Self {
            player: None,
            clips: None,
            local: None,
            voices: RwLock::new(VoiceSelector::new(voices)),
            dwell,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.voices.clone(),
            Duration::from_millis(config.playback.dwell_ms),
        )
    }

    pub fn with_player(mut self, player: Arc<dyn ClipPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    pub fn with_clip_source(mut self, clips: Arc<dyn ClipSource>) -> Self {
        self.clips = Some(clips);
        self
    }

    /// Attach the local engine and derive voices from its catalog.
    pub fn with_local_speech(mut self, local: Arc<dyn LocalSpeech>) -> Self {
        self.refresh_voices(&local.voices());
        self.local = Some(local);
        self
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// The local engine's catalog changed; pick voices again.
    pub fn refresh_voices(&self, catalog: &[String]) {
        self.voices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh(catalog);
    }

    pub fn voice_for(&self, persona: PersonaId) -> Option<String> {
        self.voices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .voice_for(persona)
            .map(str::to_string)
    }

    /// Stop every audible source.
    pub fn silence(&self) {
        if let Some(player) = &self.player {
            player.stop();
        }
        if let Some(local) = &self.local {
            local.cancel();
        }
    }

    /// Voice `turn`. Completes exactly once: when the audio ends, after the
    /// dwell if nothing could speak, or as soon as `cancel` fires.
    pub async fn resolve(&self, turn: &Turn, cancel: CancellationToken) -> ResolveOutcome {
        self.silence();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.silence();
                ResolveOutcome::new(Resolution::Cancelled, None)
            }
            outcome = self.resolve_uncancelled(turn) => outcome,
        }
    }

    async fn resolve_uncancelled(&self, turn: &Turn) -> ResolveOutcome {
        if let Some(audio_ref) = turn.audio_ref() {
            match self.play_clip(audio_ref).await {
                Ok(()) => return ResolveOutcome::new(Resolution::Played(SpeechSource::CachedClip), None),
                Err(e) => warn!(speaker = %turn.speaker, error = %e, "clip failed, using local voice"),
            }
            return self.fall_back(turn, None).await;
        }

        let fetched = match self.fetch_clip(turn).await {
            Ok(audio_ref) => Some(audio_ref),
            Err(e) => {
                debug!(speaker = %turn.speaker, error = %e, "no clip for turn");
                None
            }
        };

        if let Some(audio_ref) = &fetched {
            match self.play_clip(audio_ref).await {
                Ok(()) => {
                    return ResolveOutcome::new(
                        Resolution::Played(SpeechSource::FetchedClip),
                        fetched,
                    );
                }
                Err(e) => {
                    warn!(speaker = %turn.speaker, error = %e, "fetched clip failed, using local voice")
                }
            }
        }

        self.fall_back(turn, fetched).await
    }

    async fn play_clip(&self, audio_ref: &str) -> Result<(), CouncilError> {
        let player = self
            .player
            .as_ref()
            .ok_or_else(|| CouncilError::SourceUnavailable("no clip player".to_string()))?;
        player.play(audio_ref).await
    }

    async fn fetch_clip(&self, turn: &Turn) -> Result<String, CouncilError> {
        let clips = self
            .clips
            .as_ref()
            .ok_or_else(|| CouncilError::SourceUnavailable("no clip backend".to_string()))?;
        let audio_ref = clips.request_clip(turn.speaker, &turn.text).await?;
        if audio_ref.trim().is_empty() {
            return Err(CouncilError::SourceUnavailable(
                "backend returned an empty clip reference".to_string(),
            ));
        }
        Ok(audio_ref)
    }

    async fn fall_back(&self, turn: &Turn, fetched_ref: Option<String>) -> ResolveOutcome {
        match &self.local {
            Some(local) => {
                let voice = self.voice_for(turn.speaker);
                match local.speak(&turn.text, voice.as_deref()).await {
                    Ok(()) => {
                        return ResolveOutcome::new(
                            Resolution::Played(SpeechSource::LocalVoice),
                            fetched_ref,
                        );
                    }
                    Err(e) => warn!(speaker = %turn.speaker, error = %e, "local voice failed"),
                }
            }
            None => debug!(speaker = %turn.speaker, "no local speech engine"),
        }

        tokio::time::sleep(self.dwell).await;
        ResolveOutcome::new(Resolution::Failed, fetched_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClips, ScriptedPlayer, ScriptedSpeech};
    use tokio::time::Instant;

    fn resolver() -> SpeechResolver {
        SpeechResolver::new(VoicesConfig::default(), Duration::from_millis(1500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_clip_plays_without_fetch() {
        let player = Arc::new(ScriptedPlayer::new().with_clip("/a.mp3", Duration::from_secs(2)));
        let clips = Arc::new(ScriptedClips::replying("/never.mp3"));
        let resolver = resolver()
            .with_player(player.clone())
            .with_clip_source(clips.clone());

        let turn = Turn::new(PersonaId::Intuition, "I feel torn").with_audio("/a.mp3");
        let started = Instant::now();
        let outcome = resolver.resolve(&turn, CancellationToken::new()).await;

        assert_eq!(outcome.resolution, Resolution::Played(SpeechSource::CachedClip));
        assert_eq!(outcome.fetched_ref, None);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(player.played(), vec!["/a.mp3".to_string()]);
        assert!(clips.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_clip_when_missing() {
        let player = Arc::new(ScriptedPlayer::new().with_clip("/gen/1.mp3", Duration::from_secs(1)));
        let clips = Arc::new(ScriptedClips::replying("/gen/1.mp3"));
        let resolver = resolver()
            .with_player(player.clone())
            .with_clip_source(clips.clone());

        let turn = Turn::new(PersonaId::Reason, "Let's weigh the options");
        let outcome = resolver.resolve(&turn, CancellationToken::new()).await;

        assert_eq!(outcome.resolution, Resolution::Played(SpeechSource::FetchedClip));
        assert_eq!(outcome.fetched_ref.as_deref(), Some("/gen/1.mp3"));
        assert_eq!(
            clips.requests(),
            vec![(PersonaId::Reason, "Let's weigh the options".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_uses_local_voice() {
        let speech = Arc::new(ScriptedSpeech::new(Duration::from_millis(700)).with_catalog(&["bf_emma", "af_sky"]));
        let resolver = resolver()
            .with_player(Arc::new(ScriptedPlayer::new()))
            .with_clip_source(Arc::new(ScriptedClips::failing()))
            .with_local_speech(speech.clone());

        let turn = Turn::new(PersonaId::Fear, "What if it fails?");
        let outcome = resolver.resolve(&turn, CancellationToken::new()).await;

        assert_eq!(outcome.resolution, Resolution::Played(SpeechSource::LocalVoice));
        // Fear prefers af_nicole, then bf_emma.
        assert_eq!(
            speech.spoken(),
            vec![("What if it fails?".to_string(), Some("bf_emma".to_string()))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_clip_without_local_fails_after_dwell() {
        let player = Arc::new(ScriptedPlayer::new().with_broken("/bad.mp3"));
        let clips = Arc::new(ScriptedClips::replying("/other.mp3"));
        let resolver = resolver()
            .with_player(player.clone())
            .with_clip_source(clips.clone());

        let turn = Turn::new(PersonaId::Intuition, "I feel torn").with_audio("/bad.mp3");
        let started = Instant::now();
        let outcome = resolver.resolve(&turn, CancellationToken::new()).await;

        assert_eq!(outcome.resolution, Resolution::Failed);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
        // A turn that arrived with a clip is never re-fetched.
        assert!(clips.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_local_voice_still_dwells() {
        let speech = Arc::new(ScriptedSpeech::failing());
        let resolver = resolver().with_local_speech(speech.clone());

        let started = Instant::now();
        let outcome = resolver
            .resolve(&Turn::new(PersonaId::Guide, "Next step."), CancellationToken::new())
            .await;

        assert_eq!(outcome.resolution, Resolution::Failed);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_audio() {
        let player = Arc::new(ScriptedPlayer::new().with_clip("/long.mp3", Duration::from_secs(30)));
        let resolver = Arc::new(resolver().with_player(player.clone()));
        let cancel = CancellationToken::new();

        let task = {
            let resolver = Arc::clone(&resolver);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let turn = Turn::new(PersonaId::Reason, "long").with_audio("/long.mp3");
                resolver.resolve(&turn, cancel).await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stops_before = player.stops();
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(outcome.resolution, Resolution::Cancelled);
        assert!(player.stops() > stops_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silences_previous_audio_first() {
        let player = Arc::new(ScriptedPlayer::new().with_clip("/a.mp3", Duration::from_millis(10)));
        let speech = Arc::new(ScriptedSpeech::new(Duration::from_millis(10)));
        let resolver = resolver()
            .with_player(player.clone())
            .with_local_speech(speech.clone());

        resolver
            .resolve(
                &Turn::new(PersonaId::Heart, "x").with_audio("/a.mp3"),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(player.stops(), 1);
        assert_eq!(speech.cancels(), 1);
    }
}
