use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use shared_chat_log::{
    broker::Broker,
    cli::{Cli, Command},
    config::BrokerConfig,
    session,
};

/// The broker logs to stdout. The client keeps stdout for chat lines and logs
/// to stderr.
fn init_tracing(command: &Command) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_target(false);
    let _ = match command {
        Command::Broker(_) => subscriber.try_init(),
        Command::Client(_) => subscriber.with_writer(std::io::stderr).try_init(),
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    match cli.command {
        Command::Broker(args) => {
            let broker = Broker::start(BrokerConfig::from(&args)).await?;
            let addr = broker.local_addr()?;
            info!("broker listening on {}", addr);
            if let Err(err) = broker.run_until_ctrl_c().await {
                warn!("broker exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => session::run(args).await?,
    }

    Ok(())
}
