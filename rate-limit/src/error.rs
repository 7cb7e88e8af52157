//! Handler error taxonomy and exit-status policy

use thiserror::Error;

use crate::handshake::Denial;

#[derive(Debug, Error)]
pub enum Error {
    /// The event line was missing or not a JSON object of the expected shape
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("no source address in event")]
    AbsentTarget,

    #[error("handshake denied: {0}")]
    HandshakeDenied(Denial),

    /// Reading the event or talking to the orchestrator failed
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Only a malformed event or a broken stdio channel fails the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MalformedEvent(_) | Error::Io(_))
    }

    /// Process exit status for this error
    pub fn exit_status(&self) -> u8 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
