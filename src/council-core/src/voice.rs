//! Per-persona voice selection for the local speech engine.

use std::collections::HashMap;

use crate::config::VoicesConfig;
use crate::persona::PersonaId;

/// Picks one engine voice per persona from the engine's catalog.
///
/// Choices are derived when a catalog arrives and kept until the next one.
#[derive(Debug, Clone, Default)]
pub struct VoiceSelector {
    config: VoicesConfig,
    chosen: HashMap<PersonaId, String>,
}

impl VoiceSelector {
    pub fn new(config: VoicesConfig) -> Self {
        Self {
            config,
            chosen: HashMap::new(),
        }
    }

    /// Re-derive every persona's voice from `catalog`.
    pub fn refresh(&mut self, catalog: &[String]) {
        self.chosen.clear();
        if catalog.is_empty() {
            return;
        }

        let mut english: Vec<&String> = catalog.iter().filter(|v| is_english(v)).collect();
        english.sort();

        for (position, persona) in PersonaId::ALL.iter().copied().enumerate() {
            let preferred = self
                .config
                .preferences_for(persona)
                .iter()
                .find(|v| catalog.contains(v));
            let fallback = self
                .config
                .default_voice
                .as_ref()
                .filter(|v| catalog.contains(v));
            let pooled = (!english.is_empty()).then(|| english[position % english.len()]);

            if let Some(voice) = preferred
                .or(fallback)
                .or(pooled)
                .or_else(|| catalog.first())
            {
                self.chosen.insert(persona, voice.clone());
            }
        }
    }

    /// Voice for `persona`, or `None` to let the engine use its own default.
    pub fn voice_for(&self, persona: PersonaId) -> Option<&str> {
        self.chosen.get(&persona).map(String::as_str)
    }
}

fn is_english(voice: &str) -> bool {
    ["af_", "am_", "bf_", "bm_"]
        .iter()
        .any(|prefix| voice.starts_with(prefix))
}
