//! Session error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;
