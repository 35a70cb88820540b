//! Conversation turns
//!
//! A session's history is an ordered sequence of turns. Besides the usual
//! `user`/`assistant` roles there is a `summary` role: a single synthetic
//! turn that replaces older history once a session grows past the
//! summarisation threshold. When present it is always first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// User message
    User,
    /// Assistant reply
    Assistant,
    /// LLM-produced digest of discarded turns
    Summary,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Summary => "summary",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn
    pub role: TurnRole,
    /// Turn content
    pub content: String,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Create a summary turn
    pub fn summary(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Summary, content)
    }

    pub fn is_summary(&self) -> bool {
        self.role == TurnRole::Summary
    }
}

/// Render turns as a transcript block for prompt assembly.
///
/// A leading summary turn becomes a context paragraph rather than a
/// dialogue line, so downstream formats that expect strict user/assistant
/// alternation stay valid.
pub fn format_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        match turn.role {
            TurnRole::Summary => {
                out.push_str("Earlier in this conversation: ");
                out.push_str(&turn.content);
                out.push_str("\n\n");
            }
            _ => {
                out.push_str(turn.role.as_str());
                out.push_str(": ");
                out.push_str(&turn.content);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("show me overdue tasks");
        assert_eq!(turn.role, TurnRole::User);
        assert!(!turn.is_summary());
    }

    #[test]
    fn test_transcript_renders_summary_as_context() {
        let turns = vec![
            Turn::summary("The user created a task called Fix Login."),
            Turn::user("assign it to Youssef"),
        ];
        let text = format_transcript(&turns);
        assert!(text.starts_with("Earlier in this conversation:"));
        assert!(text.contains("user: assign it to Youssef"));
        assert!(!text.contains("summary:"));
    }
}
