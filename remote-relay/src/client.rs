use anyhow::{Context, Result};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::Message,
};
use tracing::{debug, info, warn};

use crate::{
    command::{Action, Command, Reply, write_command},
    error::TransportError,
    server::{Transport, WS_PATH},
};

const QUIT: &str = "quit";
const PROMPT: &str = "\nEnter command: ";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub transport: Transport,
}

/// What a line of operator input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Blank,
    Send(Command),
}

/// Turns one line of operator input into a command.
///
/// Only `open` takes an argument; the rest of the line after it is the URL.
/// Anything after other actions is dropped.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if line == QUIT {
        return Input::Quit;
    }

    let (action, rest) = match line.split_once(char::is_whitespace) {
        Some((action, rest)) => (action, rest.trim()),
        None => (line, ""),
    };

    if action == Action::Open.as_str() {
        Input::Send(Command::open(rest))
    } else {
        Input::Send(Command::new(action))
    }
}

/// The client's half of a relay connection.
pub enum Link {
    /// Fire-and-forget; the relay never answers.
    Tcp(TcpStream),
    /// Replies are printed by a background task as they arrive.
    WebSocket {
        sink: SplitSink<WsStream, Message>,
        replies: JoinHandle<()>,
    },
}

impl Link {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        match config.transport {
            Transport::Tcp => Self::tcp(&config.server).await,
            Transport::WebSocket => Self::websocket(&config.server).await,
        }
    }

    pub async fn tcp(server: &str) -> Result<Self> {
        let stream = TcpStream::connect(server)
            .await
            .with_context(|| format!("failed to connect to {server}"))?;
        info!("connected to {server}");
        Ok(Link::Tcp(stream))
    }

    pub async fn websocket(server: &str) -> Result<Self> {
        let url = format!("ws://{server}{WS_PATH}");
        let (socket, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        info!("connected to {url}");

        let (sink, stream) = socket.split();
        let replies = tokio::spawn(print_replies(stream));
        Ok(Link::WebSocket { sink, replies })
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        match self {
            Link::Tcp(stream) => write_command(stream, command).await?,
            Link::WebSocket { sink, .. } => {
                let text = String::from_utf8_lossy(&command.encode()).into_owned();
                sink.send(Message::Text(text)).await?;
            }
        }
        debug!(action = %command.action, "sent command");
        Ok(())
    }

    pub async fn close(self) {
        match self {
            Link::Tcp(mut stream) => {
                if let Err(error) = stream.shutdown().await {
                    warn!(?error, "failed to shutdown connection cleanly");
                }
            }
            Link::WebSocket { mut sink, replies } => {
                if let Err(error) = sink.close().await {
                    debug!(?error, "failed to close websocket cleanly");
                }
                replies.abort();
            }
        }
    }
}

pub async fn run(config: ClientConfig) -> Result<()> {
    let mut link = Link::connect(&config).await?;
    let mut stdout = io::stdout();
    print_banner(&mut stdout).await?;

    let stdin = BufReader::new(io::stdin());
    let mut stderr = io::stderr();
    read_commands(stdin, &mut stdout, &mut stderr, &mut link).await?;
    link.close().await;

    Ok(())
}

/// Prompts for and forwards commands until `quit` or end of input.
///
/// A failed send is reported on `errors` and the loop keeps going. Returns
/// how many commands were sent successfully.
pub async fn read_commands<R, W, E>(
    mut input: R,
    output: &mut W,
    errors: &mut E,
    link: &mut Link,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut line = String::new();
    let mut sent = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }

        let command = match parse_input(&line) {
            Input::Quit => break,
            Input::Blank => continue,
            Input::Send(command) => command,
        };

        match link.send(&command).await {
            Ok(()) => sent += 1,
            Err(err) => write_line(errors, &format!("Error sending command: {err}")).await?,
        }
    }

    Ok(sent)
}

async fn print_banner<W>(output: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let banner = "\
Connected to remote control relay
Available commands:
- play: Play/Resume video
- pause: Pause video
- next: Next video
- previous: Previous video
- volumeUp: Increase volume
- volumeDown: Decrease volume
- open <url>: Open URL in the browser
- quit: Exit the application
";
    output.write_all(banner.as_bytes()).await?;
    output.flush().await
}

async fn print_replies(mut stream: SplitStream<WsStream>) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                debug!(?error, "reply stream ended");
                break;
            }
        };

        let result = match serde_json::from_str::<Reply>(&text) {
            Ok(Reply::Status { status }) => write_stdout(&format!("*** {status}")).await,
            Ok(Reply::Error { error }) => write_stderr(&format!("!!! {error}")).await,
            Err(_) => write_stdout(&format!("*** {text}")).await,
        };
        if result.is_err() {
            break;
        }
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    write_line(&mut io::stdout(), line).await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    write_line(&mut io::stderr(), line).await
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
