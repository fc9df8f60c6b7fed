//! Gateway session bookkeeping.

use std::time::Duration;

use serde::Serialize;

/// How a dispatch sequence number relates to what we have already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Newer than anything seen; the session sequence has advanced.
    Fresh,
    /// At or below the current sequence; already delivered.
    Duplicate,
    /// The frame carried no sequence number.
    Unsequenced,
}

/// Resumable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Session ID from READY
    pub session_id: Option<String>,

    /// Last dispatch sequence received
    pub sequence: Option<u64>,

    /// Endpoint to resume on, from READY
    pub resume_url: Option<String>,

    /// Heartbeat interval from the latest Hello
    #[serde(skip)]
    pub heartbeat_interval: Option<Duration>,
}

impl Session {
    /// Check if we have a resumable session.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    /// Record a new session from READY. The sequence carried by READY itself
    /// has already been observed.
    pub fn start(&mut self, session_id: String, resume_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_url = resume_url;
    }

    /// Forget the session so the next handshake identifies.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.sequence = None;
        self.resume_url = None;
    }

    /// Advance the sequence if `sequence` is newer.
    pub fn observe(&mut self, sequence: Option<u64>) -> SequenceCheck {
        let Some(sequence) = sequence else {
            return SequenceCheck::Unsequenced;
        };
        match self.sequence {
            Some(current) if sequence <= current => SequenceCheck::Duplicate,
            _ => {
                self.sequence = Some(sequence);
                SequenceCheck::Fresh
            }
        }
    }
}
