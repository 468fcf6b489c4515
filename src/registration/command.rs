//! Inbound text classification.

use super::model::RegistrationType;
use super::prompts::tokens;

/// What an inbound text means, before session state is considered.
///
/// Whether a command applies depends on the session: selectors only act
/// when no session exists, yes/no only at `AwaitingMore`. Everywhere else
/// the raw text is field data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Select(RegistrationType),
    Cancel,
    Yes,
    No,
    Text,
}

impl Command {
    /// Classify message content. Literals must match exactly.
    pub fn parse(content: &str) -> Self {
        match content.trim() {
            tokens::START => Self::Start,
            tokens::SINGLE => Self::Select(RegistrationType::Single),
            tokens::TEAM => Self::Select(RegistrationType::Team),
            tokens::CANCEL => Self::Cancel,
            tokens::YES => Self::Yes,
            tokens::NO => Self::No,
            _ => Self::Text,
        }
    }
}
