//! STOMP 1.2 frame skeleton: enough of the wire format to negotiate a
//! connection (`CONNECT`/`STOMP` in, `CONNECTED` out). Header value
//! backslash-escaping (`\n`, `\c`, `\\`) is not implemented — no frame this
//! module parses needs it, and adding it without a caller to exercise it
//! would be unverified.

use strand_net::ReadBuffer;

use crate::cursor::prime;
use crate::error::{ParseError, ParseResult};

pub const EOL: u8 = b'\n';
pub const NULL: u8 = 0;
pub const COMMAND_CONNECT: &str = "STOMP";
pub const COMMAND_CONNECTED: &str = "CONNECTED";
pub const HEADER_ACCEPT_VERSION_1_2: &str = "accept-version:1.2";

/// Outcome of attempting to recognize a frame against a cursor that may not
/// yet hold the whole thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMatch {
    NoMatch,
    IncompleteMatch,
    FullMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1_2,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::V1_2 => "1.2",
        }
    }
}

/// Classify a parse outcome as a [`FrameMatch`]. The cursor abstraction is
/// forward-only (no rewind), so unlike the buffer-scanning original this
/// can't distinguish "doesn't look like this frame" found early from found
/// late; both paths that aren't `Incomplete` collapse to `NoMatch`.
pub fn classify<T>(result: &Result<T, ParseResult>) -> FrameMatch {
    match result {
        Ok(_) => FrameMatch::FullMatch,
        Err(r) if r.error == ParseError::Incomplete => FrameMatch::IncompleteMatch,
        Err(_) => FrameMatch::NoMatch,
    }
}

fn read_line<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    let mut out = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(b'\n') => {
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
                break;
            }
            Some(b'\r') => cursor.advance().map_err(ParseResult::from_cursor_error)?,
            Some(c) => {
                out.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Shared by every frame type: the command line is the first line of the
/// frame, terminated by EOL.
pub fn read_command<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    prime(cursor)?;
    read_line(cursor)
}

fn read_headers<C: ReadBuffer>(cursor: &mut C) -> Result<Vec<(String, String)>, ParseResult> {
    let mut headers = Vec::new();
    loop {
        if cursor.peek() == Some(b'\n') {
            cursor.advance().map_err(ParseResult::from_cursor_error)?;
            break;
        }
        let line = read_line(cursor)?;
        match line.split_once(':') {
            Some((k, v)) => headers.push((k.to_string(), v.to_string())),
            None => return Err(ParseResult::err(ParseError::ExpectingColon)),
        }
    }
    Ok(headers)
}

/// Body runs until the terminating NUL, which is consumed.
fn read_body<C: ReadBuffer>(cursor: &mut C) -> Result<Vec<u8>, ParseResult> {
    let mut out = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(NULL) => {
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
                break;
            }
            Some(c) => {
                out.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    Ok(out)
}

fn parse_heartbeat(value: &str) -> (u32, u32) {
    value
        .split_once(',')
        .and_then(|(out_ms, in_ms)| Some((out_ms.trim().parse().ok()?, in_ms.trim().parse().ok()?)))
        .unwrap_or((0, 0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub host: String,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub version: Version,
    pub heartbeat_out_ms: u32,
    pub heartbeat_in_ms: u32,
}

impl Connect {
    pub fn parse<C: ReadBuffer>(cursor: &mut C) -> Result<Self, ParseResult> {
        let command = read_command(cursor)?;
        if command != COMMAND_CONNECT && command != "CONNECT" {
            return Err(ParseResult::err(ParseError::InvalidMethod));
        }
        let headers = read_headers(cursor)?;
        let _body = read_body(cursor)?;

        let mut host = None;
        let mut login = None;
        let mut passcode = None;
        let mut heartbeat_out_ms = 0;
        let mut heartbeat_in_ms = 0;
        for (key, value) in &headers {
            match key.as_str() {
                "host" => host = Some(value.clone()),
                "login" => login = Some(value.clone()),
                "passcode" => passcode = Some(value.clone()),
                "heart-beat" => (heartbeat_out_ms, heartbeat_in_ms) = parse_heartbeat(value),
                _ => {}
            }
        }
        let host = host.ok_or_else(|| ParseResult::err(ParseError::InvalidFieldValue))?;
        Ok(Self {
            host,
            login,
            passcode,
            version: Version::V1_2,
            heartbeat_out_ms,
            heartbeat_in_ms,
        })
    }

    pub fn generate(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(COMMAND_CONNECT.as_bytes());
        out.push(EOL);
        out.extend_from_slice(HEADER_ACCEPT_VERSION_1_2.as_bytes());
        out.push(EOL);
        out.extend_from_slice(format!("host:{}", self.host).as_bytes());
        out.push(EOL);
        if let Some(login) = &self.login {
            out.extend_from_slice(format!("login:{login}").as_bytes());
            out.push(EOL);
        }
        if let Some(passcode) = &self.passcode {
            out.extend_from_slice(format!("passcode:{passcode}").as_bytes());
            out.push(EOL);
        }
        out.extend_from_slice(
            format!("heart-beat:{},{}", self.heartbeat_out_ms, self.heartbeat_in_ms).as_bytes(),
        );
        out.push(EOL);
        out.push(EOL);
        out.push(NULL);
        out
    }
}

/// Server's reply to a successful `Connect`. Generate-only: nothing in
/// this system parses a `CONNECTED` frame it didn't itself emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    pub version: Version,
    pub session_id: String,
    pub server: String,
    pub heartbeat_out_ms: u32,
    pub heartbeat_in_ms: u32,
}

impl Connected {
    pub fn generate(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(COMMAND_CONNECTED.as_bytes());
        out.push(EOL);
        out.extend_from_slice(format!("version:{}", self.version.as_str()).as_bytes());
        out.push(EOL);
        out.extend_from_slice(format!("session:{}", self.session_id).as_bytes());
        out.push(EOL);
        out.extend_from_slice(format!("server:{}", self.server).as_bytes());
        out.push(EOL);
        out.extend_from_slice(
            format!("heart-beat:{},{}", self.heartbeat_out_ms, self.heartbeat_in_ms).as_bytes(),
        );
        out.push(EOL);
        out.push(EOL);
        out.push(NULL);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_net::StringReadBuffer;

    #[test]
    fn parses_connect_frame() {
        let mut c = StringReadBuffer::new(
            b"STOMP\nhost:localhost\nlogin:bob\nheart-beat:1000,2000\n\n\x00".to_vec(),
        );
        let connect = Connect::parse(&mut c).unwrap();
        assert_eq!(connect.host, "localhost");
        assert_eq!(connect.login.as_deref(), Some("bob"));
        assert_eq!(connect.heartbeat_out_ms, 1000);
        assert_eq!(connect.heartbeat_in_ms, 2000);
    }

    #[test]
    fn connect_generate_round_trips_through_parse() {
        let connect = Connect {
            host: "localhost".to_string(),
            login: Some("bob".to_string()),
            passcode: None,
            version: Version::V1_2,
            heartbeat_out_ms: 500,
            heartbeat_in_ms: 500,
        };
        let wire = connect.generate();
        let mut c = StringReadBuffer::new(wire);
        let parsed = Connect::parse(&mut c).unwrap();
        assert_eq!(parsed, connect);
    }

    #[test]
    fn truncated_connect_is_incomplete_match() {
        let mut c = StringReadBuffer::new(b"STOMP\nhost:localhost\n".to_vec());
        let result = Connect::parse(&mut c);
        assert_eq!(classify(&result), FrameMatch::IncompleteMatch);
    }

    #[test]
    fn connected_frame_carries_session_and_server() {
        let connected = Connected {
            version: Version::V1_2,
            session_id: "sess-1".to_string(),
            server: "strand/0.1".to_string(),
            heartbeat_out_ms: 0,
            heartbeat_in_ms: 0,
        };
        let wire = connected.generate();
        assert!(wire.starts_with(COMMAND_CONNECTED.as_bytes()));
        assert_eq!(*wire.last().unwrap(), NULL);
    }
}
