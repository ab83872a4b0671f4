//! Remote clip playback.
//!
//! There is no audio device here: a clip is downloaded and then held for as
//! long as it would take to hear it, which is what paces the council.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::resolve_clip_url;
use crate::config::BackendConfig;
use crate::error::CouncilError;
use crate::speech::ClipPlayer;

/// Bitrate assumed for compressed clips we cannot measure.
const ASSUMED_BITS_PER_SEC: f64 = 128_000.0;

pub struct HttpClipPlayer {
    client: reqwest::Client,
    api_base: String,
    save_dir: Option<PathBuf>,
    current: Mutex<CancellationToken>,
}

impl HttpClipPlayer {
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
            api_base: config.api_base.clone(),
            save_dir: None,
            current: Mutex::new(CancellationToken::new()),
        })
    }

    /// Keep a copy of every downloaded clip in `dir`.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CouncilError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CouncilError::PlaybackFailure(format!("{}: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CouncilError::PlaybackFailure(format!("{}: {}", url, e)))?;
        if bytes.is_empty() {
            return Err(CouncilError::PlaybackFailure(format!("{}: empty clip", url)));
        }
        Ok(bytes.to_vec())
    }

    async fn keep(&self, url: &str, bytes: &[u8]) {
        let Some(dir) = &self.save_dir else {
            return;
        };
        let path = dir.join(clip_file_name(url));
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!(path = %path.display(), error = %e, "could not keep clip");
        }
    }

    fn fresh_token(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = CancellationToken::new();
        current.clone()
    }
}

#[async_trait]
impl ClipPlayer for HttpClipPlayer {
    async fn play(&self, audio_ref: &str) -> Result<(), CouncilError> {
        let url = resolve_clip_url(&self.api_base, audio_ref);
        let token = self.fresh_token();

        let bytes = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            bytes = self.download(&url) => bytes?,
        };
        self.keep(&url, &bytes).await;

        let length = clip_duration(&bytes);
        debug!(%url, ms = length.as_millis() as u64, "holding for clip");
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(length) => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Length of a clip: exact for WAV, estimated from size otherwise.
pub fn clip_duration(bytes: &[u8]) -> Duration {
    match hound::WavReader::new(Cursor::new(bytes)) {
        Ok(reader) if reader.spec().sample_rate > 0 => Duration::from_secs_f64(
            f64::from(reader.duration()) / f64::from(reader.spec().sample_rate),
        ),
        _ => Duration::from_secs_f64(bytes.len() as f64 * 8.0 / ASSUMED_BITS_PER_SEC),
    }
}

fn clip_file_name(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("clip");
    last.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: usize, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_wav_duration_from_header() {
        let bytes = wav_bytes(36_000, 24_000);
        assert_eq!(clip_duration(&bytes), Duration::from_millis(1500));
    }

    #[test]
    fn test_compressed_duration_estimated() {
        let bytes = vec![0xFFu8; 32_000];
        assert_eq!(clip_duration(&bytes), Duration::from_secs(2));
    }

    #[test]
    fn test_clip_file_name() {
        assert_eq!(clip_file_name("http://h:8000/audio/turn_1.mp3?x=1"), "turn_1.mp3");
        assert_eq!(clip_file_name("http://h:8000/audio/"), "audio");
        assert_eq!(clip_file_name("http://h/a b.wav"), "a_b.wav");
    }
}
