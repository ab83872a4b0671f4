//! Splits one mixed-persona text blob into per-persona segments.
//!
//! Label markers such as `Facts:` or `**Heart:**` switch the speaking
//! persona. Text before the first marker belongs to the council's default
//! persona. When a blob carries no marker at all, the council's phrase cues
//! get one guess at the speaker.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::council::Council;
use crate::error::CouncilError;
use crate::persona::PersonaId;

/// One persona's share of a blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub persona: PersonaId,
    pub text: String,
}

impl Segment {
    pub fn new(persona: PersonaId, text: impl Into<String>) -> Self {
        Self {
            persona,
            text: text.into(),
        }
    }
}

/// Marker scanner and cue table for one council.
#[derive(Debug, Clone)]
pub struct PersonaSegmenter {
    markers: Regex,
    cues: Vec<(PersonaId, Regex)>,
    default_persona: PersonaId,
}

impl PersonaSegmenter {
    pub fn new(council: &dyn Council) -> Result<Self, CouncilError> {
        let labels = council
            .members()
            .iter()
            .map(|p| regex::escape(p.label()))
            .collect::<Vec<_>>()
            .join("|");
        let markers = Regex::new(&format!(
            r#"(?i)(?:^|[\s"'(\[])[*_]{{0,2}}({labels})[*_]{{0,2}}[)\]]?\s*:[*_]{{0,2}}"#
        ))
        .map_err(|e| CouncilError::ConfigError(format!("Bad marker pattern: {}", e)))?;

        let cues = council
            .cues()
            .iter()
            .map(|cue| {
                Regex::new(&format!("(?i){}", cue.pattern))
                    .map(|re| (cue.persona, re))
                    .map_err(|e| {
                        CouncilError::ConfigError(format!(
                            "Bad cue pattern for {}: {}",
                            cue.persona, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            markers,
            cues,
            default_persona: council.default_persona(),
        })
    }

    pub fn default_persona(&self) -> PersonaId {
        self.default_persona
    }

    /// Split `blob` into ordered segments. Never returns an empty list.
    pub fn segment(&self, blob: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut current = self.default_persona;
        let mut cursor = 0;
        let mut saw_marker = false;

        for caps in self.markers.captures_iter(blob) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_run(&mut segments, current, &blob[cursor..whole.start()]);
            current = label.as_str().parse().unwrap_or(self.default_persona);
            cursor = whole.end();
            saw_marker = true;
        }

        if !saw_marker {
            let persona = self.detect_persona(blob).unwrap_or(self.default_persona);
            return vec![Segment::new(persona, blob.trim())];
        }

        push_run(&mut segments, current, &blob[cursor..]);
        if segments.is_empty() {
            segments.push(Segment::new(current, String::new()));
        }
        segments
    }

    /// Guess the speaker of unlabeled text from the cue table.
    pub fn detect_persona(&self, text: &str) -> Option<PersonaId> {
        self.cues
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(persona, _)| *persona)
    }

    /// Remove every marker, leaving only spoken content.
    pub fn strip_markers(&self, blob: &str) -> String {
        self.markers.replace_all(blob, " ").into_owned()
    }
}

fn push_run(segments: &mut Vec<Segment>, persona: PersonaId, run: &str) {
    let text = run.trim();
    if !text.is_empty() {
        segments.push(Segment::new(persona, text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::{InnerTriad, SixVoices};

    fn six() -> PersonaSegmenter {
        PersonaSegmenter::new(&SixVoices).unwrap()
    }

    fn triad() -> PersonaSegmenter {
        PersonaSegmenter::new(&InnerTriad).unwrap()
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_two_labeled_segments() {
        let segments = six().segment("Facts: The data shows growth. Heart: I feel hopeful.");
        assert_eq!(
            segments,
            vec![
                Segment::new(PersonaId::Facts, "The data shows growth."),
                Segment::new(PersonaId::Heart, "I feel hopeful."),
            ]
        );
    }

    #[test]
    fn test_emphasis_and_case_variants() {
        let segments = six().segment("**CAUTION:** Slow down.\n*optimist*: But look!\n__creator__ : Paint it.");
        let personas: Vec<_> = segments.iter().map(|s| s.persona).collect();
        assert_eq!(
            personas,
            vec![PersonaId::Caution, PersonaId::Optimist, PersonaId::Creator]
        );
        assert_eq!(segments[1].text, "But look!");
        assert_eq!(segments[2].text, "Paint it.");
    }

    #[test]
    fn test_preamble_goes_to_default_persona() {
        let segments = triad().segment("Okay, listen. Fear: This could go wrong.");
        assert_eq!(segments[0], Segment::new(PersonaId::Intuition, "Okay, listen."));
        assert_eq!(segments[1], Segment::new(PersonaId::Fear, "This could go wrong."));
    }

    #[test]
    fn test_empty_runs_between_markers_dropped() {
        let segments = triad().segment("Reason: Fear: Stop. Intuition:   ");
        assert_eq!(segments, vec![Segment::new(PersonaId::Fear, "Stop.")]);
    }

    #[test]
    fn test_non_member_labels_are_not_markers() {
        // "Heart" sits on the six-voice council, not the triad.
        let segments = triad().segment("Reason: Heart: listen to it.");
        assert_eq!(segments, vec![Segment::new(PersonaId::Reason, "Heart: listen to it.")]);
    }

    #[test]
    fn test_marker_after_punctuation() {
        let segments = six().segment(r#"Facts: The data shows growth."Heart: Good. (Fear): Careful."#);
        let personas: Vec<_> = segments.iter().map(|s| s.persona).collect();
        assert_eq!(personas, vec![PersonaId::Facts, PersonaId::Heart, PersonaId::Fear]);
        assert_eq!(segments[0].text, "The data shows growth.");
        assert_eq!(segments[1].text, "Good.");
        assert_eq!(segments[2].text, "Careful.");
    }

    #[test]
    fn test_label_inside_word_is_not_a_marker() {
        let segments = triad().segment("Be reasonable: pick one.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Be reasonable: pick one.");
    }

    #[test]
    fn test_no_markers_single_default_segment() {
        let segments = triad().segment("  Hello there, how are you today?  ");
        assert_eq!(
            segments,
            vec![Segment::new(PersonaId::Intuition, "Hello there, how are you today?")]
        );
    }

    #[test]
    fn test_no_markers_uses_cue_when_it_matches() {
        let segments = triad().segment("I'm so scared this will fail.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].persona, PersonaId::Fear);
    }

    #[test]
    fn test_blank_and_marker_only_blobs_never_empty() {
        let blank = six().segment("   ");
        assert_eq!(blank, vec![Segment::new(PersonaId::Guide, "")]);

        let only_marker = six().segment("Heart:");
        assert_eq!(only_marker, vec![Segment::new(PersonaId::Heart, "")]);
    }

    #[test]
    fn test_segments_reconstruct_spoken_content() {
        let segmenter = six();
        let blobs = [
            "Guide: Welcome. Facts: Revenue rose 4%. **Heart:** That's a relief!\nCaution: Watch costs.",
            "Just one voice here, no labels.",
            "Before anything. Creator: Build a garden. Optimist: It'll bloom.",
        ];
        for blob in blobs {
            let segments = segmenter.segment(blob);
            assert!(!segments.is_empty());
            assert!(segments.iter().all(|s| !s.text.is_empty()));
            let joined = segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            assert_eq!(normalize(&joined), normalize(&segmenter.strip_markers(blob)));
        }
    }

    #[test]
    fn test_detect_persona_first_match_wins() {
        let segmenter = six();
        // Both Facts and Heart cues match; Facts comes first in the table.
        assert_eq!(
            segmenter.detect_persona("I feel the data is clear"),
            Some(PersonaId::Facts)
        );
        assert_eq!(segmenter.detect_persona("Imagine a new path"), Some(PersonaId::Creator));
        assert_eq!(segmenter.detect_persona("Mm-hm."), None);
    }
}
