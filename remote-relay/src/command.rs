use std::{fmt, io};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DecodeError, TransportError};

/// Longest raw-stream line accepted, line ending included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A single remote-control instruction as it travels over the wire.
///
/// `action` is kept as free text so that unknown actions still decode and
/// reach the executor, which treats them as no-ops. `value` only carries
/// meaning for [`Action::Open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub value: String,
}

/// The actions the executor knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play,
    Pause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Open,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Play,
        Action::Pause,
        Action::Next,
        Action::Previous,
        Action::VolumeUp,
        Action::VolumeDown,
        Action::Open,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Play => "play",
            Action::Pause => "pause",
            Action::Next => "next",
            Action::Previous => "previous",
            Action::VolumeUp => "volumeUp",
            Action::VolumeDown => "volumeDown",
            Action::Open => "open",
        }
    }

    /// Matches the exact wire spelling; action names are case-sensitive.
    pub fn from_wire(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            value: String::new(),
        }
    }

    pub fn open(url: impl Into<String>) -> Self {
        Self {
            action: Action::Open.as_str().to_string(),
            value: url.into(),
        }
    }

    /// The recognized action, or `None` when the peer sent something we do not handle.
    pub fn action(&self) -> Option<Action> {
        Action::from_wire(&self.action)
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serializing a struct of two strings cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let command: Command = serde_json::from_slice(payload)?;
        if command.action.is_empty() {
            return Err(DecodeError::MissingAction);
        }
        Ok(command)
    }
}

impl From<Action> for Command {
    fn from(action: Action) -> Self {
        Command::new(action.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Acknowledgements the server sends back on bidirectional transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Status { status: String },
    Error { error: String },
}

impl Reply {
    pub fn connected() -> Self {
        Reply::Status {
            status: "connected".to_string(),
        }
    }

    pub fn executed() -> Self {
        Reply::Status {
            status: "command executed".to_string(),
        }
    }

    pub fn invalid_format() -> Self {
        Reply::Error {
            error: "invalid command format".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status { status } => write!(f, "status: {status}"),
            Reply::Error { error } => write!(f, "error: {error}"),
        }
    }
}

/// Reads the next non-empty line from a newline-framed stream.
///
/// Returns the raw payload without its line ending, or `Ok(None)` once the
/// peer closes its half of the connection. A line longer than
/// [`MAX_FRAME_LEN`] is a decode error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    loop {
        frame.clear();
        let bytes = (&mut *reader)
            .take(MAX_FRAME_LEN as u64 + 1)
            .read_until(b'\n', &mut frame)
            .await?;
        if bytes == 0 {
            return Ok(None);
        }
        if frame.last() != Some(&b'\n') && frame.len() > MAX_FRAME_LEN {
            return Err(DecodeError::FrameTooLong {
                limit: MAX_FRAME_LEN,
            }
            .into());
        }

        while matches!(frame.last(), Some(b'\n' | b'\r')) {
            frame.pop();
        }
        if frame.is_empty() {
            continue;
        }

        return Ok(Some(frame));
    }
}

pub async fn write_command<W>(writer: &mut W, command: &Command) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = command.encode();
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
