use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncReadExt, AsyncWrite, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::broadcast,
};
use tracing::{debug, info, warn};

use crate::{
    config::{BrokerConfig, SharedSecret},
    error::ChatError,
    message::{BrokerToClient, ClientToBroker, read_message, write_message},
    store::MessageStore,
};

/// Upper bound on the opening `hello` line. Nothing past it is buffered for a
/// peer that has not authenticated yet.
const MAX_HELLO_BYTES: u64 = 4 * 1024;

/// Owns the shared [`MessageStore`] and serves it to authenticated clients.
pub struct Broker {
    listener: TcpListener,
    state: Arc<BrokerState>,
}

impl Broker {
    /// Binds the listener. Fails before touching the network when no secret is set.
    pub async fn start(config: BrokerConfig) -> Result<Self, ChatError> {
        if config.secret.is_empty() {
            return Err(ChatError::AuthConfig);
        }

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ChatError::Bind {
                addr: config.listen,
                source,
            })?;

        Ok(Self {
            listener,
            state: Arc::new(BrokerState::new(config.secret)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared state handle; stays readable after `run_until` consumes the broker.
    pub fn state(&self) -> Arc<BrokerState> {
        Arc::clone(&self.state)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Broker { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&state);
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_shutdown(state: &BrokerState) {
    info!(entries = state.store.len(), "broker shutting down");
    if state.shutdown.send(()).is_err() {
        debug!("no live sessions to stop");
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<BrokerState>,
) {
    match result {
        Ok((stream, peer)) => spawn_client_handler(stream, peer, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_client_handler(stream: TcpStream, peer: SocketAddr, state: &Arc<BrokerState>) {
    let state = Arc::clone(state);
    // Subscribe before spawning so a shutdown racing the spawn is not missed.
    let shutdown = state.shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, state, shutdown).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

/// State shared by every session of one broker.
pub struct BrokerState {
    instance: u64,
    store: MessageStore,
    secret: SharedSecret,
    shutdown: broadcast::Sender<()>,
}

impl BrokerState {
    fn new(secret: SharedSecret) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            instance: rand::random(),
            store: MessageStore::new(),
            secret,
            shutdown,
        }
    }

    /// Random id announced in every `welcome`.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn messages(&self) -> Vec<String> {
        self.store.get_all()
    }

    fn authenticate(&self, offered: &str) -> Result<(), HandshakeError> {
        if self.secret.matches(offered) {
            Ok(())
        } else {
            Err(HandshakeError::BadSecret)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HandshakeError {
    BadSecret,
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<BrokerState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = writer;

    let authenticated = select! {
        biased;
        _ = shutdown.recv() => return Ok(()),
        result = perform_handshake(&mut reader, &mut writer, &state) => result?,
    };
    if !authenticated {
        info!(%peer, "rejected client with wrong secret");
        return Ok(());
    }

    debug!(%peer, "client authenticated");
    run_client_session(&state, &mut reader, &mut writer, &mut shutdown).await?;
    debug!(%peer, "client disconnected");

    Ok(())
}

/// Reads the opening `hello` frame. Returns `false` when the secret was rejected.
async fn perform_handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    state: &BrokerState,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut hello = reader.take(MAX_HELLO_BYTES);
    let secret = match read_message::<_, ClientToBroker>(&mut hello).await? {
        Some(ClientToBroker::Hello { secret }) => secret,
        Some(_) => {
            write_message(
                writer,
                &BrokerToClient::Error {
                    message: "expected hello message first".to_string(),
                },
            )
            .await?;
            anyhow::bail!("client skipped the handshake");
        }
        None => anyhow::bail!("connection closed before handshake"),
    };

    match state.authenticate(&secret) {
        Ok(()) => {
            let welcome = BrokerToClient::Welcome {
                instance: state.instance,
            };
            write_message(writer, &welcome).await?;
            Ok(true)
        }
        Err(HandshakeError::BadSecret) => {
            write_message(
                writer,
                &BrokerToClient::Rejected {
                    reason: "shared secret mismatch".to_string(),
                },
            )
            .await?;
            Ok(false)
        }
    }
}

async fn run_client_session<R, W>(
    state: &BrokerState,
    reader: &mut R,
    writer: &mut W,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        select! {
            biased;
            _ = shutdown.recv() => break,
            request = read_message::<_, ClientToBroker>(reader) => {
                let Some(request) = request? else {
                    break;
                };
                let reply = handle_request(state, request);
                write_message(writer, &reply).await?;
            }
        }
    }

    Ok(())
}

fn handle_request(state: &BrokerState, request: ClientToBroker) -> BrokerToClient {
    match request {
        ClientToBroker::Append { message } => {
            let index = state.store.append(message);
            debug!(index, "message appended");
            BrokerToClient::Appended { index }
        }
        ClientToBroker::GetAll => BrokerToClient::Messages {
            messages: state.store.get_all(),
        },
        ClientToBroker::Hello { .. } => BrokerToClient::Error {
            message: "already connected".to_string(),
        },
    }
}
