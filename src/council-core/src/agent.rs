//! Events from the realtime voice agent.
//!
//! The agent streams one audio track for the whole council. What reaches us
//! is its session lifecycle, the text it is speaking and who has the floor.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// The agent: one blob spanning any number of personas.
    Ai,
    /// Transcribed speech of the user.
    User,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// The agent is waiting for the user to talk.
    Listening,
    Speaking,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Connect,
    Disconnect,
    Message {
        message: String,
        source: MessageSource,
    },
    ModeChange {
        mode: AgentMode,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_events() {
        let message: AgentEvent =
            serde_json::from_str(r#"{"type":"message","message":"Facts: Up 4%.","source":"ai"}"#)
                .unwrap();
        assert_eq!(
            message,
            AgentEvent::Message {
                message: "Facts: Up 4%.".to_string(),
                source: MessageSource::Ai,
            }
        );

        let mode: AgentEvent =
            serde_json::from_str(r#"{"type":"mode_change","mode":"listening"}"#).unwrap();
        assert_eq!(
            mode,
            AgentEvent::ModeChange {
                mode: AgentMode::Listening
            }
        );

        let connect: AgentEvent = serde_json::from_str(r#"{"type":"connect"}"#).unwrap();
        assert_eq!(connect, AgentEvent::Connect);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let parsed = serde_json::from_str::<AgentEvent>(
            r#"{"type":"message","message":"hi","source":"system"}"#,
        );
        assert!(parsed.is_err());
    }
}
