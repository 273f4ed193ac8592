//! Stream Reconciler
//!
//! Folds the peer's inbound frames into the transcript, one frame at a time,
//! in arrival order.
//!
//! - `chunk`: extend the trailing assistant message verbatim, or open a new
//!   assistant turn when the trailing message is not assistant-authored
//! - `end`: close the turn, clear the generation flag and adopt the peer's
//!   next id
//!
//! No buffering, no reordering and no deduplication: a replayed frame is
//! applied again.

use std::time::Instant;

use tracing::{debug, info};

use crate::messages::{InboundFrame, MessageId};
use crate::transcript::{Transcript, TranscriptError};

/// Turn-level state shared between the reconciler and the controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnState {
    /// A generation is in progress (set on send, cleared on `end`)
    pub generating: bool,
    /// Peer-authoritative id for the next user-authored message
    pub next_id: MessageId,
}

/// What applying one frame did to the transcript
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new assistant turn was opened with the first fragment
    TurnOpened {
        /// Provisional id of the new assistant message
        id: MessageId,
    },
    /// The trailing assistant message was extended
    Extended {
        /// Id of the extended message
        id: MessageId,
    },
    /// The turn ended
    TurnEnded {
        /// Id of the turn that was closed, if one was open
        closed: Option<MessageId>,
        /// New next id adopted from the frame
        next_message_id: MessageId,
        /// Peer asked the client to end the session
        should_exit: bool,
    },
}

/// Applies inbound frames to a transcript
#[derive(Debug, Default)]
pub struct StreamReconciler {
    fragments: u32,
    turn_started: Option<Instant>,
}

impl StreamReconciler {
    /// Create a reconciler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame
    ///
    /// # Errors
    ///
    /// Propagates a transcript contract violation; the transcript is left
    /// unchanged in that case.
    pub fn apply(
        &mut self,
        frame: InboundFrame,
        transcript: &mut Transcript,
        turn: &mut TurnState,
    ) -> Result<ReconcileOutcome, TranscriptError> {
        match frame {
            InboundFrame::Chunk { content } => {
                self.fragments += 1;

                if let Some(id) = transcript.extend_last(&content) {
                    debug!(id = id, bytes = content.len(), "Fragment appended");
                    return Ok(ReconcileOutcome::Extended { id });
                }

                // Placeholder id; confirmed by the next reload
                let id = turn.next_id + 1;
                transcript.open_turn(id, content)?;
                self.turn_started = Some(Instant::now());
                debug!(id = id, "Assistant turn opened");
                Ok(ReconcileOutcome::TurnOpened { id })
            }
            InboundFrame::End {
                next_message_id,
                should_exit,
            } => {
                let closed = transcript.close_turn();
                turn.generating = false;
                turn.next_id = next_message_id;

                let elapsed_ms = self
                    .turn_started
                    .take()
                    .map(|start| start.elapsed().as_millis());
                info!(
                    closed = ?closed,
                    fragments = self.fragments,
                    elapsed_ms = ?elapsed_ms,
                    next_message_id = next_message_id,
                    "Turn complete"
                );
                self.fragments = 0;

                Ok(ReconcileOutcome::TurnEnded {
                    closed,
                    next_message_id,
                    should_exit,
                })
            }
        }
    }

    /// Forget per-turn metrics after a turn was abandoned
    pub fn reset(&mut self) {
        self.fragments = 0;
        self.turn_started = None;
    }

    /// Fragments seen in the current turn
    #[must_use]
    pub fn fragment_count(&self) -> u32 {
        self.fragments
    }
}
