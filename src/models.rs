//! Core data types shared by the flows, the server, and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in a [`Transcript`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only, chronologically ordered conversation history.
///
/// The only write operation is [`Transcript::append_exchange`], which adds a
/// user turn immediately followed by its assistant reply. Existing turns are
/// never exposed mutably.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a question and its answer as two consecutive turns.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        let now = Utc::now();
        self.turns.push(Turn {
            role: Role::User,
            content: question.into(),
            created_at: now,
        });
        self.turns.push(Turn {
            role: Role::Assistant,
            content: answer.into(),
            created_at: now,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// What the contract flow should ask the model to do with pasted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractMode {
    Debug,
    Generate,
}

impl ContractMode {
    pub const ALL: [ContractMode; 2] = [ContractMode::Debug, ContractMode::Generate];

    /// Radio button label.
    pub fn label(&self) -> &'static str {
        match self {
            ContractMode::Debug => "Debug Code",
            ContractMode::Generate => "Generate Code",
        }
    }

    /// Heading shown above the model output.
    pub fn results_heading(&self) -> &'static str {
        match self {
            ContractMode::Debug => "Debugging Results",
            ContractMode::Generate => "Code Generation Results",
        }
    }

    /// Label of the submit button while this mode is selected.
    pub fn submit_label(&self) -> &'static str {
        match self {
            ContractMode::Debug => "Submit Debug Request",
            ContractMode::Generate => "Submit Generate Request",
        }
    }

    /// Spinner text while the request is in flight.
    pub fn spinner_text(&self) -> &'static str {
        match self {
            ContractMode::Debug => "Debugging code...",
            ContractMode::Generate => "Generating code...",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractMode::Debug => "debug",
            ContractMode::Generate => "generate",
        }
    }
}

impl fmt::Display for ContractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "debug code" => Ok(ContractMode::Debug),
            "generate" | "generate code" => Ok(ContractMode::Generate),
            other => anyhow::bail!("Unknown mode: '{}'. Use debug or generate.", other),
        }
    }
}

/// A documentation fragment returned by vector search.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    /// Similarity score reported by the store (higher is closer).
    pub score: f64,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_exchange_orders_user_then_assistant() {
        let mut t = Transcript::new();
        t.append_exchange("q1", "a1");
        t.append_exchange("q2", "a2");

        let roles: Vec<Role> = t.turns().iter().map(|turn| turn.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(t.turns()[2].content, "q2");
        assert_eq!(t.turns()[3].content, "a2");
    }

    #[test]
    fn test_earlier_turns_unchanged_after_append() {
        let mut t = Transcript::new();
        t.append_exchange("first", "reply");
        let before = t.turns().to_vec();
        t.append_exchange("second", "reply 2");
        assert_eq!(&t.turns()[..2], before.as_slice());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_contract_mode_parse() {
        assert_eq!("debug".parse::<ContractMode>().unwrap(), ContractMode::Debug);
        assert_eq!(
            "Generate Code".parse::<ContractMode>().unwrap(),
            ContractMode::Generate
        );
        assert!("refactor".parse::<ContractMode>().is_err());
    }
}
