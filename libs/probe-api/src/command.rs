//! Operator instruction grammar: `[<record-id>][<token>]`.
//!
//! The same encoding carries both record actions (`[12][CLONE]`) and
//! routing decisions (`[12][Outgoing]`). Anything that does not match the
//! grammar exactly is treated as no instruction at all.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// A parsed `[id][token]` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: RecordId,
    pub token: String,
}

impl Command {
    /// Parse the bracketed pair. Returns `None` for malformed input:
    /// missing brackets, non-digit ids, ids that overflow `u64`, empty or
    /// non-word tokens, or trailing characters.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix('[')?;
        let (id, rest) = rest.split_once(']')?;
        let rest = rest.strip_prefix('[')?;
        let token = rest.strip_suffix(']')?;

        if token.is_empty() || !token.chars().all(is_word_char) {
            return None;
        }
        let id = id.parse::<RecordId>().ok()?;
        Some(Self {
            id,
            token: token.to_string(),
        })
    }

    /// The token interpreted as a record action, if it names one.
    pub fn action(&self) -> Option<Action> {
        self.token.parse().ok()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}]", self.id, self.token)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ════════════════════════════════════════════════════════════════
//  Action
// ════════════════════════════════════════════════════════════════

/// Ad-hoc operator action on a held record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Copy attributes and payload into a fresh record.
    #[serde(rename = "CLONE")]
    Duplicate,
    /// Remove the record from the stage.
    #[serde(rename = "DROP")]
    Discard,
    /// Load the record into the draft editor.
    #[serde(rename = "EDIT")]
    Edit,
}

impl Action {
    /// Wire token, matched case-sensitively.
    pub fn token(self) -> &'static str {
        match self {
            Action::Duplicate => "CLONE",
            Action::Discard => "DROP",
            Action::Edit => "EDIT",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLONE" => Ok(Action::Duplicate),
            "DROP" => Ok(Action::Discard),
            "EDIT" => Ok(Action::Edit),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_pair() {
        let cmd = Command::parse("[7][Outgoing]").unwrap();
        assert_eq!(cmd.id, RecordId(7));
        assert_eq!(cmd.token, "Outgoing");
        assert_eq!(cmd.to_string(), "[7][Outgoing]");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "",
            "7 Outgoing",
            "[7]",
            "[7][]",
            "[][CLONE]",
            "[x][CLONE]",
            "[-1][CLONE]",
            "[ 7][CLONE]",
            "[7][CLO NE]",
            "[7][CLONE]x",
            "x[7][CLONE]",
            "[7][CLONE",
            "[7][a-b]",
            "[184467440737095516160][CLONE]",
        ] {
            assert!(Command::parse(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[test]
    fn action_tokens_are_case_sensitive() {
        assert_eq!(Command::parse("[1][CLONE]").unwrap().action(), Some(Action::Duplicate));
        assert_eq!(Command::parse("[1][DROP]").unwrap().action(), Some(Action::Discard));
        assert_eq!(Command::parse("[1][EDIT]").unwrap().action(), Some(Action::Edit));
        assert_eq!(Command::parse("[1][clone]").unwrap().action(), None);
        assert_eq!(Command::parse("[1][Outgoing]").unwrap().action(), None);
    }

    #[test]
    fn action_serializes_as_wire_token() {
        assert_eq!(serde_json::to_string(&Action::Discard).unwrap(), "\"DROP\"");
        for action in [Action::Duplicate, Action::Discard, Action::Edit] {
            assert_eq!(action.token().parse::<Action>().unwrap(), action);
        }
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_never_panics(input in ".{0,64}") {
            let _ = Command::parse(&input);
        }

        #[test]
        fn formatted_commands_parse_back(id in any::<u64>(), token in "[A-Za-z0-9_]{1,16}") {
            let text = format!("[{id}][{token}]");
            let cmd = Command::parse(&text);
            prop_assert_eq!(cmd, Some(Command { id: RecordId(id), token }));
        }
    }
}
