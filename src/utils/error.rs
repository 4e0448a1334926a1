//! The `error` module defines the error taxonomy shared by both delivery
//! paths.
//!
//! Integrity and serialization failures are scoped to a single request or
//! delivery; transport failures propagate to whoever started the operation.

use thiserror::Error;

use crate::integrity::{IntegrityError, KeyError};
use crate::order::OrderError;

#[derive(Debug, Error)]
pub enum Error {
    /// The payload is not a pizza order.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An order that breaks a field invariant, refused before it is sent.
    #[error("invalid order: {0}")]
    Order(#[from] OrderError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Connection refused, broker unreachable, socket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer broke the protocol: wrong method, error frame, unexpected reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
