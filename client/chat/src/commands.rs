//! Input line parsing
//!
//! Plain lines are user turns. Lines starting with `/` are commands:
//!
//! ```text
//! /edit <id> <text>     replace a message's content
//! /delete <id>          delete a message
//! /regen                replace the last reply
//! /history              reload and print the transcript
//! /fields               print the field set
//! /set <field> <value>  update one field
//! /save                 snapshot the game
//! /status               connection and turn state
//! /help                 this list
//! /quit                 leave
//! ```

use gm_session_core::MessageId;
use thiserror::Error;

/// Help text printed by `/help`
pub const HELP: &str = "\
/edit <id> <text>     replace a message's content
/delete <id>          delete a message
/regen                replace the last reply
/history              reload and print the transcript
/fields               print the field set
/set <field> <value>  update one field
/save                 snapshot the game
/status               connection and turn state
/quit                 leave";

/// One parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// A user turn
    Say(String),
    /// `/edit`
    Edit {
        /// Target message
        id: MessageId,
        /// Replacement content
        content: String,
    },
    /// `/delete`
    Delete(MessageId),
    /// `/regen`
    Regenerate,
    /// `/history`
    History,
    /// `/fields`
    Fields,
    /// `/set`
    Set {
        /// Field name
        field: String,
        /// New value
        value: String,
    },
    /// `/save`
    Save,
    /// `/status`
    Status,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
}

/// Why a line could not be parsed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command name is not known
    #[error("Unknown command /{0} (try /help)")]
    Unknown(String),

    /// Arguments missing or malformed
    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line
///
/// # Errors
///
/// `Unknown` for an unrecognised `/command`, `Usage` for bad arguments.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, args) = split_word(rest);
    match name {
        "edit" => {
            let (id, content) = split_word(args);
            let id = parse_id(id).ok_or(CommandError::Usage("/edit <id> <text>"))?;
            if content.is_empty() {
                return Err(CommandError::Usage("/edit <id> <text>"));
            }
            Ok(Command::Edit {
                id,
                content: content.to_string(),
            })
        }
        "delete" | "del" => parse_id(args)
            .map(Command::Delete)
            .ok_or(CommandError::Usage("/delete <id>")),
        "regen" | "regenerate" => Ok(Command::Regenerate),
        "history" => Ok(Command::History),
        "fields" => Ok(Command::Fields),
        "set" => {
            let (field, value) = split_word(args);
            if field.is_empty() {
                return Err(CommandError::Usage("/set <field> <value>"));
            }
            Ok(Command::Set {
                field: field.to_string(),
                value: value.to_string(),
            })
        }
        "save" => Ok(Command::Save),
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// First whitespace-delimited word and the trimmed remainder
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn parse_id(s: &str) -> Option<MessageId> {
    s.trim().parse().ok()
}
