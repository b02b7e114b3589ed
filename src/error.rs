use crate::sync::SyncStage;
use std::fmt;
use thiserror::Error;
use wxcore::DecodeError;

/// Failure of a single HTTP round-trip, including a body that did not decode.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] anyhow::Error),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("could not encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl TransportError {
    /// The backend's own error code, when the failure was signalled in-band.
    pub fn backend_code(&self) -> Option<i64> {
        match self {
            TransportError::Decode(DecodeError::Backend { code }) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Handshake,
    StatusPoll,
    Redirect,
    Init,
    StatusNotify,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginStage::Handshake => "handshake identifier",
            LoginStage::StatusPoll => "status poll",
            LoginStage::Redirect => "redirect resolve",
            LoginStage::Init => "session init",
            LoginStage::StatusNotify => "status notify",
        })
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("client is already logged in")]
    AlreadyLoggedIn,
    #[error("login was rejected or expired (code {code})")]
    Rejected { code: i64 },
    #[error("login cancelled")]
    Cancelled,
    #[error("login failed during {stage}: {source}")]
    Failed {
        stage: LoginStage,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("backend refused the message (code {code})")]
    Backend { code: i64 },
    #[error("send failed: {0}")]
    Transport(#[source] TransportError),
}

impl From<TransportError> for SendError {
    fn from(e: TransportError) -> Self {
        match e.backend_code() {
            Some(code) => SendError::Backend { code },
            None => SendError::Transport(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("sync loop is already running")]
    AlreadyRunning,
    #[error("sync stalled: {stage} failed {attempts} times in a row, last error: {last_error}")]
    Stalled {
        stage: SyncStage,
        attempts: u32,
        #[source]
        last_error: TransportError,
    },
}
