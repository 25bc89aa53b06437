//! Error types shared by the broker, the connection proxy, and the chat client.
//!
//! Every failure surfaces synchronously to the operation that caused it. Nothing
//! in this crate retries on its own.

use std::{io, net::SocketAddr, time::Duration};

use thiserror::Error;

/// Top-level error returned by broker startup and client operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The broker could not claim its listen address.
    #[error("failed to bind broker to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The broker was started without a shared secret.
    #[error("broker requires a non-empty shared secret")]
    AuthConfig,

    /// The broker refused the shared secret offered during the handshake.
    #[error("broker rejected the shared secret: {reason}")]
    Auth { reason: String },

    /// Transport-level failure. Fatal to the connection it happened on.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The broker returned a log shorter than what this client already consumed.
    #[error("broker log has {len} entries but this client already read {cursor}")]
    LogRewound { cursor: usize, len: usize },

    /// A reconnect reached a different broker instance than the one this
    /// client's cursor counts into. Its log is unrelated, whatever its length.
    #[error("broker restarted after this client read {cursor} entries")]
    BrokerRestarted { cursor: usize },
}

impl ChatError {
    /// True for errors that leave the client's connection unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, ChatError::Connection(_))
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("broker at {addr} is unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("broker closed the connection")]
    Dropped,

    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("broker did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("unexpected reply from broker: {0}")]
    Protocol(String),

    /// The connection failed earlier; a new one has to be created explicitly.
    #[error("connection is closed after an earlier failure")]
    Closed,
}

impl From<io::Error> for ChatError {
    fn from(err: io::Error) -> Self {
        ChatError::Connection(ConnectionError::Io(err))
    }
}
