//! Local fallback speech using kokoro-tiny.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CouncilError;
use crate::speech::LocalSpeech;

/// Kokoro renders mono audio at 24 kHz.
pub const SAMPLE_RATE: u32 = 24_000;

/// Kokoro has a strict limit on input length.
const MAX_CHUNK_CHARS: usize = 200;
/// 0.3 s between chunks, otherwise words get clipped.
const CHUNK_GAP_SAMPLES: usize = 7_200;
/// 0.5 s after the last chunk.
const TRAILING_PAD_SAMPLES: usize = 12_000;
/// Silence between utterances in a saved recording.
const RECORDING_GAP_SECS: f32 = 0.8;

/// Speaks turns locally when no clip can be played.
pub struct KokoroSpeech {
    engine: Arc<Mutex<TtsEngine>>,
    catalog: Vec<String>,
    rate: f32,
    recording: Option<Mutex<Vec<Vec<f32>>>>,
    current: Mutex<CancellationToken>,
}

impl KokoroSpeech {
    /// Initialize the engine (downloads the model on first run).
    pub async fn new(rate: f32) -> Result<Self, CouncilError> {
        let engine = TtsEngine::new().await.map_err(|e| {
            CouncilError::SynthesisUnavailable(format!("Failed to initialize TTS: {}", e))
        })?;
        let catalog = engine.voices();
        info!(voices = catalog.len(), "local speech ready");

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            catalog,
            rate,
            recording: None,
            current: Mutex::new(CancellationToken::new()),
        })
    }

    /// Keep every utterance so the session can be saved afterwards.
    pub fn with_recording(mut self) -> Self {
        self.recording = Some(Mutex::new(Vec::new()));
        self
    }

    pub fn validate_voice(&self, voice_id: &str) -> Result<(), CouncilError> {
        if voice_id.is_empty() {
            return Err(CouncilError::SynthesisUnavailable(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                format_available_voices(&self.catalog)
            )));
        }
        if !self.catalog.iter().any(|v| v == voice_id) {
            return Err(CouncilError::SynthesisUnavailable(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                format_available_voices(&self.catalog)
            )));
        }
        Ok(())
    }

    /// Write the recorded utterances to `path`. Returns false if nothing was spoken.
    pub fn save_recording(&self, path: &Path) -> Result<bool, CouncilError> {
        let Some(recording) = &self.recording else {
            return Ok(false);
        };
        let segments = recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if segments.is_empty() {
            return Ok(false);
        }

        let combined = combine_audio_segments(segments, RECORDING_GAP_SECS, SAMPLE_RATE);
        write_wav(path, &combined)?;
        info!(path = %path.display(), "recording saved");
        Ok(true)
    }

    fn fresh_token(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = CancellationToken::new();
        current.clone()
    }
}

#[async_trait]
impl LocalSpeech for KokoroSpeech {
    fn voices(&self) -> Vec<String> {
        self.catalog.clone()
    }

    async fn speak(&self, text: &str, voice: Option<&str>) -> Result<(), CouncilError> {
        if let Some(voice) = voice {
            self.validate_voice(voice)?;
        }
        let token = self.fresh_token();

        let engine = Arc::clone(&self.engine);
        let owned_text = text.to_string();
        let owned_voice = voice.map(str::to_string);
        let synthesis = tokio::task::spawn_blocking(move || {
            synthesize_chunks(&engine, &owned_text, owned_voice.as_deref())
        });

        let samples = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            joined = synthesis => joined
                .map_err(|e| CouncilError::SynthesisUnavailable(format!("Synthesis task failed: {}", e)))??,
        };
        let samples = adjust_audio_speed(samples, self.rate);

        debug!(samples = samples.len(), voice = ?voice, "speaking locally");
        play_out(&token, samples, self.recording.as_ref()).await;
        Ok(())
    }

    fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Hold for the utterance, then record it if it was heard to the end.
async fn play_out(
    token: &CancellationToken,
    samples: Vec<f32>,
    recording: Option<&Mutex<Vec<Vec<f32>>>>,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(samples_duration(samples.len())) => {}
    }
    if let Some(recording) = recording {
        recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(samples);
    }
}

fn synthesize_chunks(
    engine: &Mutex<TtsEngine>,
    text: &str,
    voice: Option<&str>,
) -> Result<Vec<f32>, CouncilError> {
    let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
    let mut all_samples = Vec::new();

    for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
        let samples = engine
            .synthesize(&chunk, voice)
            .map_err(|e| CouncilError::SynthesisUnavailable(format!("Synthesis failed: {}", e)))?;
        all_samples.extend(samples);
        all_samples.extend(std::iter::repeat_n(0.0, CHUNK_GAP_SAMPLES));
    }

    if all_samples.is_empty() {
        return Err(CouncilError::SynthesisUnavailable(
            "Nothing to synthesize".to_string(),
        ));
    }
    all_samples.extend(std::iter::repeat_n(0.0, TRAILING_PAD_SAMPLES));
    Ok(all_samples)
}

fn format_available_voices(catalog: &[String]) -> String {
    let mut english: Vec<&String> = catalog
        .iter()
        .filter(|v| {
            v.starts_with("af_") || v.starts_with("am_") || v.starts_with("bf_") || v.starts_with("bm_")
        })
        .collect();
    english.sort();

    english
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn samples_duration(samples: usize) -> Duration {
    Duration::from_secs_f64(samples as f64 / f64::from(SAMPLE_RATE))
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

/// Split text into chunks that are safe for synthesis: sentences first, commas if needed.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current.len() + sentence.len() <= max_chars {
            current.push_str(sentence);
            current.push(' ');
            continue;
        }

        flush(&mut current, &mut chunks);
        if sentence.len() <= max_chars {
            current.push_str(sentence);
            current.push(' ');
            continue;
        }

        for part in sentence.split_inclusive(',') {
            let part = part.trim();
            if current.len() + part.len() > max_chars {
                flush(&mut current, &mut chunks);
            }
            current.push_str(part);
            current.push(' ');
        }
    }
    flush(&mut current, &mut chunks);

    chunks
}

/// Resample by linear interpolation. Rate < 1.0 is slower, > 1.0 faster.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 || rate <= 0.0 {
        return samples;
    }

    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Join segments with `gap_seconds` of silence between them.
pub fn combine_audio_segments(
    segments: Vec<Vec<f32>>,
    gap_seconds: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let gap_samples = (gap_seconds * sample_rate as f32) as usize;
    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(std::iter::repeat_n(0.0, gap_samples));
        }
        combined.extend(segment);
    }

    combined
}

/// Mono 32-bit float WAV at [`SAMPLE_RATE`].
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<(), CouncilError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// File name for a saved session recording.
pub fn generate_output_filename(challenge: &str) -> String {
    let sanitized: String = challenge
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    format!("Council - {}.wav", sanitized.trim())
}
