//! Client-side proxy for the broker's message store.
//!
//! A [`Connection`] carries no chat logic: it turns `broadcast` and
//! `get_messages` into one request/response exchange each and reports transport
//! failures as they happen. Any error leaves the connection unusable; callers
//! recover by connecting again.

use std::{future::Future, time::Duration};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    config::ConnectionConfig,
    error::{ChatError, ConnectionError},
    message::{BrokerToClient, ClientToBroker, read_message, write_message},
};

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    server: String,
    instance: u64,
    request_timeout: Option<Duration>,
}

impl Connection {
    /// Opens a TCP session and authenticates with the shared secret.
    ///
    /// The TCP connect and the `hello`/`welcome` exchange share one
    /// `request_timeout` deadline.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ChatError> {
        let (mut connection, reply) = with_deadline(config.request_timeout, open(config)).await?;
        match reply {
            BrokerToClient::Welcome { instance } => {
                connection.instance = instance;
                info!(server = %connection.server, instance, "connected to broker");
                Ok(connection)
            }
            BrokerToClient::Rejected { reason } => {
                warn!(server = %connection.server, %reason, "broker rejected handshake");
                Err(ChatError::Auth { reason })
            }
            other => Err(unexpected(other).into()),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Id the broker announced in its `welcome`. A different value on a later
    /// connection means the broker restarted with a new log.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Appends `message` to the broker's log and waits for the acknowledgement.
    pub async fn broadcast(&mut self, message: &str) -> Result<(), ConnectionError> {
        let request = ClientToBroker::Append {
            message: message.to_string(),
        };
        match self.exchange(&request).await? {
            BrokerToClient::Appended { index } => {
                debug!(index, "broadcast stored");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Returns the broker's whole log. Tracking what is new is up to the caller.
    pub async fn get_messages(&mut self) -> Result<Vec<String>, ConnectionError> {
        match self.exchange(&ClientToBroker::GetAll).await? {
            BrokerToClient::Messages { messages } => Ok(messages),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close(mut self) {
        if let Err(error) = self.writer.shutdown().await {
            debug!(?error, "failed to shut down connection cleanly");
        }
    }

    async fn exchange(
        &mut self,
        request: &ClientToBroker,
    ) -> Result<BrokerToClient, ConnectionError> {
        let limit = self.request_timeout;
        with_deadline(limit, self.roundtrip(request)).await
    }

    async fn roundtrip(
        &mut self,
        request: &ClientToBroker,
    ) -> Result<BrokerToClient, ConnectionError> {
        write_message(&mut self.writer, request).await?;
        read_message::<_, BrokerToClient>(&mut self.reader)
            .await?
            .ok_or(ConnectionError::Dropped)
    }
}

/// Connects and sends `hello`, returning the broker's first reply unjudged.
async fn open(config: &ConnectionConfig) -> Result<(Connection, BrokerToClient), ConnectionError> {
    let stream = TcpStream::connect(config.server.as_str())
        .await
        .map_err(|source| ConnectionError::Unreachable {
            addr: config.server.clone(),
            source,
        })?;

    let (reader, writer) = stream.into_split();
    let mut connection = Connection {
        reader: BufReader::new(reader),
        writer,
        server: config.server.clone(),
        instance: 0,
        request_timeout: config.request_timeout,
    };

    let hello = ClientToBroker::Hello {
        secret: config.secret.as_str().to_string(),
    };
    let reply = connection.roundtrip(&hello).await?;
    Ok((connection, reply))
}

async fn with_deadline<T, F>(
    limit: Option<Duration>,
    operation: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match limit {
        Some(limit) => timeout(limit, operation)
            .await
            .map_err(|_| ConnectionError::TimedOut(limit))?,
        None => operation.await,
    }
}

fn unexpected(reply: BrokerToClient) -> ConnectionError {
    match reply {
        BrokerToClient::Error { message } => ConnectionError::Protocol(message),
        other => ConnectionError::Protocol(format!("unexpected reply {other:?}")),
    }
}
