//! Transcript Store
//!
//! The ordered conversation log. Insertion order is conversation order; the
//! store never sorts by id because deletes leave the peer's id space sparse.
//!
//! # Open turn
//!
//! At most one message is "open": the trailing assistant message that is
//! still receiving fragments. While a turn is open nothing may be appended
//! behind it and its content may not be edited.
//!
//! # Deletion
//!
//! The store has no delete operation. Removal is confirmed by the peer and
//! then observed through [`Transcript::replace`] with the peer's
//! authoritative history. The only local removal is [`Transcript::retract`],
//! which takes back a provisional message that never reached the peer.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::messages::{Message, MessageId, Role};

/// Contract violations on the transcript
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// No message with this id
    #[error("Message {0} not found")]
    NotFound(MessageId),

    /// The message is the open streaming turn
    #[error("Message {0} is still streaming")]
    TurnOpen(MessageId),
}

/// Ordered, mutable conversation log
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    open_turn: Option<MessageId>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log with the peer's authoritative history
    ///
    /// Closes any open turn. Every entry is treated as confirmed.
    pub fn replace(&mut self, history: Vec<Message>) {
        self.messages = history
            .into_iter()
            .map(|mut msg| {
                msg.provisional = false;
                msg
            })
            .collect();
        self.open_turn = None;

        if self.has_duplicate_ids() {
            warn!(count = self.messages.len(), "Peer history contains duplicate ids");
        }
        debug!(count = self.messages.len(), "Transcript replaced");
    }

    /// Append a message to the end
    ///
    /// # Errors
    ///
    /// `TurnOpen` while a turn is still streaming.
    pub fn append(&mut self, message: Message) -> Result<(), TranscriptError> {
        if let Some(open) = self.open_turn {
            return Err(TranscriptError::TurnOpen(open));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Open a new assistant turn holding `fragment`
    ///
    /// # Errors
    ///
    /// `TurnOpen` if another turn is still streaming.
    pub fn open_turn(
        &mut self,
        id: MessageId,
        fragment: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        self.append(Message::provisional(id, Role::Assistant, fragment))?;
        self.open_turn = Some(id);
        Ok(())
    }

    /// Append a fragment verbatim to the trailing assistant message
    ///
    /// Marks that message as the open turn. Returns its id, or `None` if the
    /// trailing message is not assistant-authored.
    pub fn extend_last(&mut self, fragment: &str) -> Option<MessageId> {
        let last = self.messages.last_mut().filter(|m| m.is_assistant())?;
        last.content.push_str(fragment);
        self.open_turn = Some(last.id);
        Some(last.id)
    }

    /// Close the open turn, returning its id
    pub fn close_turn(&mut self) -> Option<MessageId> {
        self.open_turn.take()
    }

    /// Replace a message's content in place
    ///
    /// Role, timestamp and position are preserved.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `TurnOpen` if it is the open streaming turn.
    pub fn edit(&mut self, id: MessageId, content: impl Into<String>) -> Result<(), TranscriptError> {
        if self.open_turn == Some(id) {
            return Err(TranscriptError::TurnOpen(id));
        }
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(TranscriptError::NotFound(id))?;
        msg.content = content.into();
        Ok(())
    }

    /// Take back a provisional message that never reached the peer
    ///
    /// Confirmed messages are never removed locally. Returns whether a
    /// message was removed.
    pub fn retract(&mut self, id: MessageId) -> bool {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.id == id && m.provisional)
        else {
            return false;
        };
        self.messages.remove(pos);
        if self.open_turn == Some(id) {
            self.open_turn = None;
        }
        true
    }

    /// Get a message by id
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The trailing message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The trailing two messages, oldest first
    #[must_use]
    pub fn last_pair(&self) -> Option<(&Message, &Message)> {
        match self.messages.as_slice() {
            [.., before, last] => Some((before, last)),
            _ => None,
        }
    }

    /// All messages in conversation order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a turn is still streaming
    #[must_use]
    pub fn is_turn_open(&self) -> bool {
        self.open_turn.is_some()
    }

    /// Id of the open turn
    #[must_use]
    pub fn open_turn_id(&self) -> Option<MessageId> {
        self.open_turn
    }

    /// Whether two messages share an id
    #[must_use]
    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.messages.len());
        self.messages.iter().any(|m| !seen.insert(m.id))
    }
}
