//! STOMP frame encoding and parsing
//!
//! Implements the subset of STOMP 1.2 the alert channel needs to talk to a
//! Spring simple broker: `CONNECT`, `SUBSCRIBE`, and reading `CONNECTED`,
//! `MESSAGE`, `RECEIPT` and `ERROR` frames. Bodies are carried as text and
//! are never altered.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while decoding STOMP frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown STOMP command '{0}'")]
    UnknownCommand(String),
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("invalid escape sequence '\\{0}' in header")]
    InvalidEscape(char),
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
    #[error("frame is missing its NUL terminator")]
    Unterminated,
}

/// STOMP frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    // CONNECT and CONNECTED headers are exempt from escaping.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated headers are kept; lookups return the first.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the `CONNECT` frame stomp.js sends on session start.
    pub fn connect(accept_version: &str, heart_beat: &str) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", accept_version)
            .header("heart-beat", heart_beat)
    }

    /// Builds a `SUBSCRIBE` frame with automatic acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    /// Returns the first value of the named header.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Encodes the frame into its wire representation, NUL terminator included.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        // A body containing NUL can only be framed with an explicit length.
        if self.body.contains('\0') && self.get_header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(FrameError::InvalidEscape(other)),
            None => return Err(FrameError::InvalidEscape(' ')),
        }
    }
    Ok(out)
}

/// Parses every frame contained in one transport message.
///
/// Heart-beats (bare EOLs) between frames are skipped, so a message holding
/// only a heart-beat yields an empty list.
pub fn parse_frames(text: &str) -> Result<Vec<Frame>, FrameError> {
    match parse_frames_partial(text) {
        (frames, None) => Ok(frames),
        (_, Some(e)) => Err(e),
    }
}

/// Like [`parse_frames`], but keeps the frames decoded before a malformed one.
///
/// Parsing stops at the first malformed frame; its error is returned next to
/// the frames that preceded it.
pub fn parse_frames_partial(text: &str) -> (Vec<Frame>, Option<FrameError>) {
    let mut frames = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return (frames, None);
        }
        match parse_one(rest) {
            Ok((frame, remaining)) => {
                frames.push(frame);
                rest = remaining;
            }
            Err(e) => return (frames, Some(e)),
        }
    }
}

fn next_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = input[..idx].strip_suffix('\r').unwrap_or(&input[..idx]);
    Some((line, &input[idx + 1..]))
}

fn parse_one(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = next_line(input).ok_or(FrameError::Unterminated)?;
    let command: Command = command_line.parse()?;
    let unescape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, after) = next_line(rest).ok_or(FrameError::Unterminated)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let (body, remaining) = match content_length {
        Some(len) => {
            // The length counts bytes; a boundary inside a character is malformed.
            if rest.len() <= len
                || !rest.is_char_boundary(len)
                || rest.as_bytes()[len] != 0
            {
                return Err(FrameError::Unterminated);
            }
            (&rest[..len], &rest[len + 1..])
        }
        None => {
            let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        remaining,
    ))
}
