//! Admin command parsing
//!
//! Operators drive re-routes by mentioning the service in a channel
//! message. The grammar is deliberately rigid: a literal mention of our own
//! identity, a command from a fixed allow-list, then positional arguments
//! whose count is validated exactly. Mention and command tokens are matched
//! through the same normalization rule as the disclaimer; argument tokens
//! are kept raw (channel names contain hyphens) apart from link unwrapping.

use crate::text::{normalize, strip_link_wrapping};
use thiserror::Error;

/// Commands reserved in the allow-list but not implemented here
pub const RESERVED_COMMANDS: &[&str] = &["UPDATE_VOTER_STATUS", "FIND_VOTER", "RESET_VOTER"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    RouteVoter {
        /// Pseudonymous voter id or raw phone number, link-unwrapped
        voter: String,
        /// Destination channel display name, e.g. `north-carolina-1`
        destination_channel: String,
        /// Whether the voter argument arrived link-wrapped (the raw form
        /// is logged when it was)
        voter_was_wrapped: bool,
    },
    /// Recognized but unimplemented command from the allow-list
    Reserved { name: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("empty command")]
    Empty,
    #[error("commands must start with the bot mention")]
    NotAddressedToUs,
    #[error("missing command name")]
    MissingCommand,
    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),
    #[error("{command} takes exactly {expected} arguments, got {got}")]
    WrongArgumentCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },
}

/// One-line usage text posted back to operators on parse failures
pub fn usage(bot_mention: &str) -> String {
    format!("Usage: {bot_mention} ROUTE_VOTER <voter-id-or-phone> <destination-channel>")
}

/// Parse an operator message into a command.
///
/// Tokens are split on runs of whitespace, so doubled spaces parse the same
/// as single ones.
pub fn parse_command(text: &str, bot_mention: &str) -> Result<AdminCommand, ParseFailure> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Err(ParseFailure::Empty);
    };
    if normalize(first) != normalize(bot_mention) {
        return Err(ParseFailure::NotAddressedToUs);
    }
    let Some(command) = tokens.get(1) else {
        return Err(ParseFailure::MissingCommand);
    };

    let normalized_command = normalize(command);
    if normalized_command == normalize("ROUTE_VOTER") {
        // mention + command + 2 arguments
        if tokens.len() != 4 {
            return Err(ParseFailure::WrongArgumentCount {
                command: "ROUTE_VOTER",
                expected: 2,
                got: tokens.len().saturating_sub(2),
            });
        }
        let (voter, voter_was_wrapped) = strip_link_wrapping(tokens[2]);
        let (destination_channel, _) = strip_link_wrapping(tokens[3]);
        return Ok(AdminCommand::RouteVoter {
            voter,
            destination_channel,
            voter_was_wrapped,
        });
    }

    for name in RESERVED_COMMANDS.iter().copied() {
        if normalized_command == normalize(name) {
            return Ok(AdminCommand::Reserved { name });
        }
    }

    Err(ParseFailure::UnknownCommand((*command).to_string()))
}
