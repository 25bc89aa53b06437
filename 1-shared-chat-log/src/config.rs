//! Runtime configuration for the broker and for client connections.

use std::{fmt, net::SocketAddr, time::Duration};

use crate::cli::{BrokerArgs, ClientArgs};

/// Default bound on connect and on each request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Static credential shared by the broker and all of its clients.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against a secret received on the wire without short-circuiting
    /// on the first differing byte.
    pub fn matches(&self, offered: &str) -> bool {
        let expected = self.0.as_bytes();
        let offered = offered.as_bytes();
        if expected.len() != offered.len() {
            return false;
        }
        expected
            .iter()
            .zip(offered)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

impl From<&str> for SharedSecret {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub listen: SocketAddr,
    pub secret: SharedSecret,
}

impl BrokerConfig {
    pub fn new(listen: SocketAddr, secret: impl Into<SharedSecret>) -> Self {
        Self {
            listen,
            secret: secret.into(),
        }
    }
}

impl From<&BrokerArgs> for BrokerConfig {
    fn from(args: &BrokerArgs) -> Self {
        Self {
            listen: args.listen,
            secret: SharedSecret::new(args.secret.clone()),
        }
    }
}

/// Where a client connects and how long it waits for the broker.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// `host:port` of the broker.
    pub server: String,
    pub secret: SharedSecret,
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(server: impl Into<String>, secret: impl Into<SharedSecret>) -> Self {
        Self {
            server: server.into(),
            secret: secret.into(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl From<&ClientArgs> for ConnectionConfig {
    fn from(args: &ClientArgs) -> Self {
        let timeout = match args.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self::new(args.server.clone(), SharedSecret::new(args.secret.clone()))
            .with_request_timeout(timeout)
    }
}
