use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const SECRET: &str = "e2e-secret";

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("shared_chat_log");
    let broker = BrokerProcess::start(&binary).await?;

    let mut john = ChatProcess::join(&binary, "John Doe", &broker.addr).await?;
    let mut harry = ChatProcess::join(&binary, "Harry Potter", &broker.addr).await?;

    // Every participant polls the same log, including their own lines.
    john.say("Hello World").await?;
    harry.expect_line("John Doe: Hello World").await?;
    john.expect_line("John Doe: Hello World").await?;

    harry.say("Hi John!").await?;
    john.expect_line("Harry Potter: Hi John!").await?;
    harry.expect_line("Harry Potter: Hi John!").await?;

    // A latecomer replays the whole log once.
    let mut ron = ChatProcess::join(&binary, "Ron", &broker.addr).await?;
    ron.expect_line("John Doe: Hello World").await?;
    ron.expect_line("Harry Potter: Hi John!").await?;

    for client in [john, harry, ron] {
        client.quit().await?;
    }

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn client_logs_stay_off_stdout() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("shared_chat_log");
    let broker = BrokerProcess::start(&binary).await?;

    let mut child = client_command(&binary, "loud", &broker.addr, SECRET)
        .env("RUST_LOG", "debug")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn client")?;
    let mut stdout = LineStream::new(child.stdout.take().context("client stdout")?);
    let mut stderr = LineStream::new(child.stderr.take().context("client stderr")?);

    let banner = stdout.next("reading the client banner").await?;
    assert_eq!(banner, format!("*** connected to {} as loud", broker.addr));

    let log = stderr.next("reading the client log").await?;
    assert!(log.contains("connected to broker"), "unexpected log line: {log}");

    let _ = child.kill().await;
    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn client_with_wrong_secret_exits_with_error() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("shared_chat_log");
    let broker = BrokerProcess::start(&binary).await?;

    let mut child = client_command(&binary, "mallory", &broker.addr, "not-the-secret")
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn client")?;

    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .context("client did not exit")??;
    assert!(!status.success());

    broker.stop().await;
    Ok(())
}

/// Line-at-a-time view of a child's output with a read deadline.
struct LineStream<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    fn new(output: R) -> Self {
        Self {
            lines: BufReader::new(output).lines(),
        }
    }

    async fn next(&mut self, doing: &str) -> Result<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .with_context(|| format!("timed out {doing}"))?
            .with_context(|| format!("i/o error {doing}"))?
            .with_context(|| format!("output closed {doing}"))
    }

    /// Discards everything until the child closes the stream.
    async fn discard(mut self) {
        while let Ok(Some(_)) = self.lines.next_line().await {}
    }
}

struct BrokerProcess {
    child: Child,
    addr: String,
    log: JoinHandle<()>,
}

impl BrokerProcess {
    /// Starts a broker on an ephemeral port and learns the port from its
    /// `broker listening on <addr>` line.
    async fn start(binary: &Path) -> Result<Self> {
        let mut child = Command::new(binary)
            .args(["broker", "--listen", "127.0.0.1:0", "--secret", SECRET])
            .env("RUST_LOG", "info")
            .env("NO_COLOR", "1")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn broker")?;

        let mut stdout = LineStream::new(child.stdout.take().context("broker stdout")?);
        let banner = stdout.next("waiting for the broker banner").await?;
        let Some((_, addr)) = banner.rsplit_once(' ') else {
            bail!("unexpected broker banner: {banner}");
        };
        ensure!(addr.contains(':'), "broker banner has no socket: {banner}");
        let addr = addr.to_string();

        // Keep the pipe flowing so the broker never blocks on logging.
        let log = tokio::spawn(stdout.discard());
        Ok(Self { child, addr, log })
    }

    async fn stop(mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
        let _ = self.log.await;
    }
}

struct ChatProcess {
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout: LineStream<ChildStdout>,
}

impl ChatProcess {
    /// Spawns a client with logging enabled and waits for its banner, which
    /// must be the first line on stdout.
    async fn join(binary: &Path, nickname: &str, addr: &str) -> Result<Self> {
        let mut child = client_command(binary, nickname, addr, SECRET)
            .args(["--poll-ms", "50"])
            .env("RUST_LOG", "info")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn client {nickname}"))?;

        let stdin = child.stdin.take().context("client stdin")?;
        let stdout = LineStream::new(child.stdout.take().context("client stdout")?);
        let mut process = Self {
            name: nickname.to_string(),
            child,
            stdin,
            stdout,
        };
        process
            .expect_line(&format!("*** connected to {addr} as {nickname}"))
            .await?;
        Ok(process)
    }

    async fn say(&mut self, line: &str) -> Result<()> {
        let framed = format!("{line}\n");
        self.stdin
            .write_all(framed.as_bytes())
            .await
            .with_context(|| format!("{} could not type '{line}'", self.name))?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn expect_line(&mut self, expected: &str) -> Result<()> {
        let doing = format!("waiting for {} to print '{expected}'", self.name);
        let line = self.stdout.next(&doing).await?;
        ensure!(line == expected, "{}: expected '{expected}', got '{line}'", self.name);
        Ok(())
    }

    /// Types `/quit` and waits for the process to exit cleanly.
    async fn quit(mut self) -> Result<()> {
        self.say("/quit").await?;
        self.expect_line("*** leaving chat").await?;
        let status = timeout(READ_TIMEOUT, self.child.wait())
            .await
            .with_context(|| format!("{} kept running after /quit", self.name))??;
        ensure!(status.success(), "{} exited with {status}", self.name);
        Ok(())
    }
}

fn client_command(binary: &Path, nickname: &str, addr: &str, secret: &str) -> Command {
    let mut command = Command::new(binary);
    command
        .args(["client", "--nickname", nickname, "--server", addr, "--secret", secret])
        .env("NO_COLOR", "1")
        .kill_on_drop(true);
    command
}
