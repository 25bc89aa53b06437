//! A shared, append-only chat log served by a broker over TCP.
//!
//! One broker process owns the log. Any number of clients connect with a shared
//! secret, append formatted messages to it, and poll it for what is new. Each
//! module focuses on one piece of that:
//!
//! - [`store`] holds the broker's append-only [`MessageStore`](store::MessageStore).
//! - [`broker`] binds the listener, authenticates clients, and serves the two
//!   remote operations, `append` and `get_all`.
//! - [`message`] is the JSON line protocol plus async read/write helpers.
//! - [`connection`] is the client-side proxy that turns local calls into
//!   request/response exchanges.
//! - [`client`] is the user-level [`ChatClient`](client::ChatClient) with its
//!   lazy connection and per-client read cursor.
//! - [`session`] drives an interactive terminal chat on top of a `ChatClient`.
//! - [`cli`] and [`config`] parse the command line into broker and connection
//!   settings; [`error`] holds the error taxonomy.
//!
//! Integration tests run a broker in-process on an ephemeral port and talk to
//! it through `ChatClient` and `Connection`.

pub mod broker;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod session;
pub mod store;

pub use broker::Broker;
pub use client::{BindingState, ChatClient};
pub use config::{BrokerConfig, ConnectionConfig, SharedSecret};
pub use connection::Connection;
pub use error::{ChatError, ConnectionError};
pub use store::MessageStore;
