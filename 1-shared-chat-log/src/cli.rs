use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the broker that owns the shared chat log.
    Broker(BrokerArgs),
    /// Connect to a broker and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// Socket address the broker should bind to. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Shared secret every client must present.
    #[arg(long, env = "CHAT_SECRET", hide_env_values = true)]
    pub secret: String,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Nickname prefixed to every message you send.
    #[arg(long)]
    pub nickname: String,

    /// Address of the broker to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: String,

    /// Shared secret expected by the broker.
    #[arg(long, env = "CHAT_SECRET", hide_env_values = true)]
    pub secret: String,

    /// How often to poll the broker for new messages, in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,

    /// Per-request timeout in milliseconds. 0 waits forever.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}
