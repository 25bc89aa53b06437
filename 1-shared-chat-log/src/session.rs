use std::{io::BufRead, thread, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncWriteExt},
    select,
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tracing::warn;

use crate::{cli::ClientArgs, client::ChatClient, config::ConnectionConfig};

/// Runs an interactive chat: stdin lines are sent, new log entries are polled
/// and printed as they arrive.
pub async fn run(args: ClientArgs) -> Result<()> {
    let config = ConnectionConfig::from(&args);
    let server = config.server.clone();
    let mut client = ChatClient::new(args.nickname.clone(), config);

    // The first fetch binds the connection and replays the history so far.
    let history = client
        .fetch_messages()
        .await
        .with_context(|| format!("failed to join chat at {server}"))?;
    write_stdout(&format!("*** connected to {server} as {}", client.nickname())).await?;
    print_messages(&history).await?;

    let mut lines = spawn_stdin_reader();
    let poll_every = Duration::from_millis(args.poll_ms.max(1));

    let outcome = run_client_loop(&mut client, &mut lines, poll_every).await;
    client.disconnect().await;
    outcome
}

/// Reads stdin on a plain thread. A pending tokio stdin read cannot be
/// cancelled and would keep the runtime from shutting down after `/quit`.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(?error, "failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

async fn run_client_loop(
    client: &mut ChatClient,
    lines: &mut mpsc::Receiver<String>,
    poll_every: Duration,
) -> Result<()> {
    let mut poll = interval(poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = poll.tick() => {
                let fresh = client.fetch_messages().await.context("failed to fetch messages")?;
                print_messages(&fresh).await?;
            }
            line = lines.recv() => {
                if !handle_stdin_input(line, client).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_stdin_input(line: Option<String>, client: &mut ChatClient) -> Result<bool> {
    let Some(line) = line else {
        return Ok(false);
    };

    let text = line.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    client
        .send_message(text)
        .await
        .context("failed to send message")?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn print_messages(messages: &[String]) -> io::Result<()> {
    for message in messages {
        write_stdout(message).await?;
    }
    Ok(())
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
