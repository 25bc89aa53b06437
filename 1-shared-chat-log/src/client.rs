//! The user-facing chat participant.
//!
//! A [`ChatClient`] is cheap to construct and never touches the network until
//! the first send or fetch. It keeps its own read cursor into the broker's log,
//! so two clients fetching after the same broadcasts each see those messages
//! exactly once. The cursor is tied to the broker instance it was advanced
//! against; reconnecting to a restarted broker fails instead of reading on.

use tracing::{debug, warn};

use crate::{
    config::ConnectionConfig,
    connection::Connection,
    error::{ChatError, ConnectionError},
};

/// Observable phase of a client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No connection attempted yet, or discarded by [`ChatClient::reconnect`].
    Unbound,
    Bound,
    /// A connect or remote call failed. Every later call fails fast until
    /// [`ChatClient::reconnect`] is called.
    Failed,
}

enum Binding {
    Unbound,
    Bound(Connection),
    Failed,
}

/// How many log entries a client has already consumed.
///
/// Only moves forward, and only to the length of a log the client just fetched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(usize);

impl Cursor {
    pub fn position(self) -> usize {
        self.0
    }

    /// Consumes `all` from the current position and advances to its end.
    pub fn take_new(&mut self, mut all: Vec<String>) -> Result<Vec<String>, ChatError> {
        if all.len() < self.0 {
            return Err(ChatError::LogRewound {
                cursor: self.0,
                len: all.len(),
            });
        }
        let fresh = all.split_off(self.0);
        self.0 = all.len() + fresh.len();
        Ok(fresh)
    }
}

pub struct ChatClient {
    nickname: String,
    config: ConnectionConfig,
    binding: Binding,
    cursor: Cursor,
    broker_instance: Option<u64>,
}

impl ChatClient {
    pub fn new(nickname: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            nickname: nickname.into(),
            config,
            binding: Binding::Unbound,
            cursor: Cursor::default(),
            broker_instance: None,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn state(&self) -> BindingState {
        match self.binding {
            Binding::Unbound => BindingState::Unbound,
            Binding::Bound(_) => BindingState::Bound,
            Binding::Failed => BindingState::Failed,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor.position()
    }

    /// Formats `text` as `"<nickname>: <text>"`, broadcasts it, and returns the
    /// formatted line once the broker has stored it.
    pub async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        let formatted = format!("{}: {}", self.nickname, text);
        let connection = self.connection().await?;
        let result = connection.broadcast(&formatted).await;
        self.settle(result)?;
        Ok(formatted)
    }

    /// Returns the messages appended since this client's previous fetch.
    pub async fn fetch_messages(&mut self) -> Result<Vec<String>, ChatError> {
        let connection = self.connection().await?;
        let result = connection.get_messages().await;
        let all = self.settle(result)?;
        let fresh = self.cursor.take_new(all)?;
        debug!(
            nickname = %self.nickname,
            new = fresh.len(),
            cursor = self.cursor.position(),
            "fetched messages"
        );
        Ok(fresh)
    }

    /// Drops the current connection, failed or not, so the next call connects
    /// afresh. The read cursor is kept, and the next connection must reach the
    /// same broker instance or fail with [`ChatError::BrokerRestarted`].
    pub async fn reconnect(&mut self) {
        let previous = std::mem::replace(&mut self.binding, Binding::Unbound);
        if let Binding::Bound(connection) = previous {
            connection.close().await;
        }
    }

    /// Closes the connection if one is open.
    pub async fn disconnect(mut self) {
        self.reconnect().await;
    }

    async fn connection(&mut self) -> Result<&mut Connection, ChatError> {
        if let Binding::Unbound = self.binding {
            match Connection::connect(&self.config).await {
                Ok(connection) => self.bind(connection).await?,
                Err(err) => {
                    warn!(nickname = %self.nickname, error = %err, "failed to connect");
                    self.binding = Binding::Failed;
                    return Err(err);
                }
            }
        }

        match &mut self.binding {
            Binding::Bound(connection) => Ok(connection),
            Binding::Unbound | Binding::Failed => Err(ConnectionError::Closed.into()),
        }
    }

    /// Stays `Unbound` when `connection` reached a broker other than the one
    /// the cursor counts into, so every call keeps reporting the restart.
    async fn bind(&mut self, connection: Connection) -> Result<(), ChatError> {
        let instance = connection.instance();
        let cursor = self.cursor.position();
        match self.broker_instance {
            Some(known) if known != instance && cursor > 0 => {
                warn!(
                    nickname = %self.nickname,
                    server = %connection.server(),
                    cursor,
                    "broker restarted since the last fetch"
                );
                connection.close().await;
                Err(ChatError::BrokerRestarted { cursor })
            }
            _ => {
                self.broker_instance = Some(instance);
                self.binding = Binding::Bound(connection);
                Ok(())
            }
        }
    }

    fn settle<T>(&mut self, result: Result<T, ConnectionError>) -> Result<T, ChatError> {
        result.map_err(|err| {
            warn!(nickname = %self.nickname, error = %err, "connection failed");
            self.binding = Binding::Failed;
            err.into()
        })
    }
}
