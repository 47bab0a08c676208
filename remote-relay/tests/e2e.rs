use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn cli_relay_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("remote-relay");

    let (mut server, mut server_stdout) = spawn_server(&binary).await?;
    let addr = read_listen_addr(&mut server_stdout).await?;

    let mut client = Command::new(binary)
        .arg("client")
        .arg("--server")
        .arg(&addr)
        .arg("--transport")
        .arg("tcp")
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn client")?;

    let mut client_stdout = BufReader::new(
        client
            .stdout
            .take()
            .context("client stdout missing after spawn")?,
    );
    let banner = read_line_expect(&mut client_stdout, "waiting for client banner").await?;
    assert_eq!(banner, "Connected to remote control relay");

    let mut stdin = client.stdin.take().context("client stdin missing")?;
    stdin.write_all(b"volumeUp\nquit\n").await?;
    stdin.flush().await?;

    // The relay logs every command it receives, even when automation is unavailable.
    let received = read_until(&mut server_stdout, |line| {
        line.contains("received command") && line.contains("volumeUp")
    })
    .await?;
    assert!(received.contains("volumeUp"));

    let status = timeout(READ_TIMEOUT, client.wait())
        .await
        .context("client did not exit after quit")??;
    assert!(status.success(), "client exited with {status}");

    let _ = server.kill().await;
    let _ = server.wait().await;

    Ok(())
}

#[tokio::test]
async fn server_refuses_an_unbindable_address() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("remote-relay");
    let blocker = std::net::TcpListener::bind("127.0.0.1:0")?;
    let taken = blocker.local_addr()?;

    let status = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .arg("server")
            .arg("--listen")
            .arg(taken.to_string())
            .env("NO_COLOR", "1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await??;

    assert!(!status.success());
    Ok(())
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--transport")
        .arg("tcp")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .kill_on_drop(true)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_listen_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_until(reader, |line| line.contains("relay listening on")).await?;
    let addr = line
        .split_whitespace()
        .last()
        .context("unexpected listening banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("listening banner missing socket: {line}"));
    }
    Ok(addr.to_string())
}

async fn read_until<F>(reader: &mut BufReader<ChildStdout>, matches: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    loop {
        let line = read_line_expect(reader, "waiting for server log line").await?;
        if matches(&line) {
            return Ok(line);
        }
    }
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    let mut line = String::new();
    let bytes = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result.with_context(|| format!("{description}: failed to read line"))?,
        Err(_) => return Err(anyhow!("{description}: timed out")),
    };
    if bytes == 0 {
        return Err(anyhow!("{description}: stream closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
