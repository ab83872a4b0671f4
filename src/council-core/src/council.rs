//! Council rosters.
//!
//! A council is the set of personas one deployment fields, the persona that
//! speaks when nobody else can be identified, and the phrase cues used to
//! guess a speaker from unlabeled text.

use crate::persona::PersonaId;

/// A content cue: text matching `pattern` probably belongs to `persona`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseCue {
    pub persona: PersonaId,
    /// Case-insensitive regular expression.
    pub pattern: &'static str,
}

/// Trait for defining council rosters.
///
/// Implement this trait to field a different set of personas.
pub trait Council: Send + Sync {
    /// Returns the registry name of this council.
    fn name(&self) -> &str;

    /// Returns the display name for the council.
    fn display_name(&self) -> &str;

    /// Members in speaking order.
    fn members(&self) -> &[PersonaId];

    /// Persona used when detection fails.
    fn default_persona(&self) -> PersonaId;

    /// Ordered cue table; the first matching cue wins.
    fn cues(&self) -> &[PhraseCue];

    /// Whether `persona` sits on this council.
    fn has_member(&self, persona: PersonaId) -> bool {
        self.members().contains(&persona)
    }
}

/// Intuition, Reason and Fear.
#[derive(Debug, Clone, Default)]
pub struct InnerTriad;

const TRIAD_MEMBERS: [PersonaId; 3] = [PersonaId::Intuition, PersonaId::Reason, PersonaId::Fear];

const TRIAD_CUES: [PhraseCue; 6] = [
    PhraseCue {
        persona: PersonaId::Fear,
        pattern: r"\b(afraid|scared|terrif\w*|what if|panic)\b",
    },
    PhraseCue {
        persona: PersonaId::Reason,
        pattern: r"\b(logic\w*|let'?s weigh|weigh(ing)? the|pros and cons|rational\w*)\b",
    },
    PhraseCue {
        persona: PersonaId::Intuition,
        pattern: r"\b(gut|i sense|deep down|instinct\w*)\b",
    },
    PhraseCue {
        persona: PersonaId::Fear,
        pattern: r"\b(risk\w*|danger\w*|worr(y|ied))\b",
    },
    PhraseCue {
        persona: PersonaId::Reason,
        pattern: r"\b(evidence|consider|therefore)\b",
    },
    PhraseCue {
        persona: PersonaId::Intuition,
        pattern: r"\b(i feel|feels? right|trust yourself)\b",
    },
];

impl Council for InnerTriad {
    fn name(&self) -> &str {
        "inner-triad"
    }

    fn display_name(&self) -> &str {
        "Inner Council (Intuition, Reason, Fear)"
    }

    fn members(&self) -> &[PersonaId] {
        &TRIAD_MEMBERS
    }

    fn default_persona(&self) -> PersonaId {
        PersonaId::Intuition
    }

    fn cues(&self) -> &[PhraseCue] {
        &TRIAD_CUES
    }
}

/// Facts, Heart, Caution, Optimist, Creator and the Guide who moderates.
#[derive(Debug, Clone, Default)]
pub struct SixVoices;

const SIX_MEMBERS: [PersonaId; 6] = [
    PersonaId::Facts,
    PersonaId::Heart,
    PersonaId::Caution,
    PersonaId::Optimist,
    PersonaId::Creator,
    PersonaId::Guide,
];

const SIX_CUES: [PhraseCue; 6] = [
    PhraseCue {
        persona: PersonaId::Facts,
        pattern: r"\b(data|evidence|numbers?|statistic\w*|research)\b",
    },
    PhraseCue {
        persona: PersonaId::Caution,
        pattern: r"\b(careful|risk\w*|downside|what if|danger\w*)\b",
    },
    PhraseCue {
        persona: PersonaId::Heart,
        pattern: r"\b(i feel|feelings?|hopeful|love|hurt\w*)\b",
    },
    PhraseCue {
        persona: PersonaId::Optimist,
        pattern: r"\b(bright side|opportunit\w*|upside|good news)\b",
    },
    PhraseCue {
        persona: PersonaId::Creator,
        pattern: r"\b(imagine|what about|new idea|brainstorm\w*)\b",
    },
    PhraseCue {
        persona: PersonaId::Guide,
        pattern: r"\b(let'?s|next step|together|to sum up)\b",
    },
];

impl Council for SixVoices {
    fn name(&self) -> &str {
        "six-voices"
    }

    fn display_name(&self) -> &str {
        "Six Voices (Facts, Heart, Caution, Optimist, Creator, Guide)"
    }

    fn members(&self) -> &[PersonaId] {
        &SIX_MEMBERS
    }

    fn default_persona(&self) -> PersonaId {
        PersonaId::Guide
    }

    fn cues(&self) -> &[PhraseCue] {
        &SIX_CUES
    }
}

/// Get a council by name.
pub fn get_council(name: &str) -> Option<Box<dyn Council>> {
    match name.to_lowercase().as_str() {
        "inner-triad" => Some(Box::new(InnerTriad)),
        "six-voices" => Some(Box::new(SixVoices)),
        _ => None,
    }
}

/// List all available council names.
pub fn available_councils() -> Vec<&'static str> {
    vec!["inner-triad", "six-voices"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_council_known_names() {
        assert_eq!(get_council("inner-triad").unwrap().name(), "inner-triad");
        assert_eq!(get_council("SIX-VOICES").unwrap().name(), "six-voices");
        assert!(get_council("parliament").is_none());
    }

    #[test]
    fn test_default_persona_is_a_member() {
        for name in available_councils() {
            let council = get_council(name).unwrap();
            assert!(council.has_member(council.default_persona()));
            assert!(!council.has_member(PersonaId::User));
        }
    }

    #[test]
    fn test_cues_only_name_members() {
        for name in available_councils() {
            let council = get_council(name).unwrap();
            for cue in council.cues() {
                assert!(council.has_member(cue.persona), "{:?} in {}", cue.persona, name);
            }
        }
    }
}
