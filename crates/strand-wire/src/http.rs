use strand_bytes::OctetBuffer;
use strand_net::ReadBuffer;

use crate::cursor::{
    eat_space, parse_chunk_hex, parse_crlf, parse_field_value, parse_sp, parse_token,
    parse_uint, parse_until_space, prime, read_exact,
};
use crate::error::{ParseError, ParseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
}

impl Method {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        }
    }

    /// Whether this method's request ordinarily carries an entity body.
    pub fn allows_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Options)
    }
}

/// Case-insensitive header multimap that preserves first-insertion order,
/// merging repeated field names with a comma per RFC 7230 §3.2.2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1.push(',');
            entry.1.push_str(value);
        } else {
            self.entries.push((key, value.to_string()));
        }
    }

    /// Replace (rather than merge with) any existing value.
    pub fn set(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key, value.to_string()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_1_1: Self = Self { major: 1, minor: 1 };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: OctetBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: OctetBuffer,
}

fn parse_http_version<C: ReadBuffer>(cursor: &mut C) -> Result<HttpVersion, ParseResult> {
    for expect in b"HTTP/" {
        match cursor.peek() {
            Some(c) if c == *expect => {
                cursor.advance().map_err(ParseResult::from_cursor_error)?
            }
            Some(_) => return Err(ParseResult::err(ParseError::InvalidVersion)),
            None => return Err(ParseResult::incomplete()),
        }
    }
    let major = match cursor.peek() {
        Some(c) if c.is_ascii_digit() => c - b'0',
        Some(_) => return Err(ParseResult::err(ParseError::InvalidVersion)),
        None => return Err(ParseResult::incomplete()),
    };
    cursor.advance().map_err(ParseResult::from_cursor_error)?;
    match cursor.peek() {
        Some(b'.') => cursor.advance().map_err(ParseResult::from_cursor_error)?,
        Some(_) => return Err(ParseResult::err(ParseError::InvalidVersion)),
        None => return Err(ParseResult::incomplete()),
    }
    let minor = match cursor.peek() {
        Some(c) if c.is_ascii_digit() => c - b'0',
        Some(_) => return Err(ParseResult::err(ParseError::InvalidVersion)),
        None => return Err(ParseResult::incomplete()),
    };
    cursor.advance().map_err(ParseResult::from_cursor_error)?;
    Ok(HttpVersion { major, minor })
}

/// Parse the header block up to and including the terminating blank line.
fn parse_headers<C: ReadBuffer>(cursor: &mut C) -> Result<HeaderMap, ParseResult> {
    let mut headers = HeaderMap::new();
    loop {
        if cursor.peek() == Some(b'\r') {
            parse_crlf(cursor)?;
            break;
        }
        let name = parse_token(cursor)?;
        if name.is_empty() {
            return Err(ParseResult::err(ParseError::ExpectingColon));
        }
        eat_space(cursor)?;
        match cursor.peek() {
            Some(b':') => cursor.advance().map_err(ParseResult::from_cursor_error)?,
            Some(_) => return Err(ParseResult::err(ParseError::ExpectingColon)),
            None => return Err(ParseResult::incomplete()),
        }
        eat_space(cursor)?;
        let value = parse_field_value(cursor)?;
        headers.insert(&name, &value);
    }
    Ok(headers)
}

/// Read the body following a header block already known to have ended.
/// `allow_body` gates the no-framing-present case: methods/responses that
/// forbid a body treat any following octet as `UnexpectedBody`.
fn parse_body<C: ReadBuffer>(
    cursor: &mut C,
    headers: &HeaderMap,
    allow_body: bool,
) -> Result<OctetBuffer, ParseResult> {
    if let Some(te) = headers.get("transfer-encoding") {
        if !te.eq_ignore_ascii_case("chunked") {
            return Err(ParseResult::err(ParseError::InvalidTransferEncoding));
        }
        let mut body = Vec::new();
        loop {
            let size = match parse_chunk_hex(cursor) {
                Ok(size) => size,
                Err(r)
                    if r.error == ParseError::Incomplete
                        && r.is_eof() =>
                {
                    return Err(ParseResult::err(ParseError::InvalidLastChunk))
                }
                Err(r) => return Err(r),
            };
            if size == 0 {
                // optional trailer, then the final blank line
                loop {
                    if cursor.peek() == Some(b'\r') {
                        parse_crlf(cursor)?;
                        break;
                    }
                    let _ = parse_token(cursor)?;
                    eat_space(cursor)?;
                    match cursor.peek() {
                        Some(b':') => cursor.advance().map_err(ParseResult::from_cursor_error)?,
                        _ => return Err(ParseResult::err(ParseError::ExpectingColon)),
                    }
                    eat_space(cursor)?;
                    let _ = parse_field_value(cursor)?;
                }
                break;
            }
            let chunk = read_exact(cursor, size, ParseError::InvalidLastChunk)?;
            body.extend_from_slice(&chunk);
            match parse_crlf(cursor) {
                Ok(()) => {}
                Err(r) if r.error == ParseError::Incomplete => {
                    return Err(ParseResult::err(ParseError::InvalidLastChunk))
                }
                Err(r) => return Err(r),
            }
        }
        return Ok(OctetBuffer::from_vec(body));
    }

    if let Some(len) = headers.get("content-length") {
        let len: u64 = len
            .parse()
            .map_err(|_| ParseResult::err(ParseError::InvalidContentLength))?;
        let bytes = read_exact(cursor, len as usize, ParseError::InvalidContentLength)?;
        return Ok(OctetBuffer::from_vec(bytes));
    }

    if !allow_body {
        return Ok(OctetBuffer::new());
    }

    match cursor.advance() {
        Ok(()) => Err(ParseResult::err(ParseError::UnexpectedBody)),
        Err(strand_net::CursorError::Eof) | Err(strand_net::CursorError::WouldBlock) => {
            Ok(OctetBuffer::new())
        }
        Err(e) => Err(ParseResult::from_cursor_error(e)),
    }
}

impl HttpRequest {
    pub fn parse<C: ReadBuffer>(cursor: &mut C) -> Result<Self, ParseResult> {
        prime(cursor)?;
        let method_text = parse_token(cursor)?;
        let method = Method::parse(&method_text)
            .ok_or_else(|| ParseResult::err(ParseError::InvalidMethod))?;
        parse_sp(cursor)?;
        let target = parse_until_space(cursor)?;
        if target.is_empty() {
            return Err(ParseResult::err(ParseError::InvalidRequestLine));
        }
        parse_sp(cursor)?;
        let version = parse_http_version(cursor)?;
        parse_crlf(cursor)?;
        let headers = parse_headers(cursor)?;
        let body = parse_body(cursor, &headers, method.allows_body())?;
        Ok(Self { method, target, version, headers, body })
    }

    pub fn serialize(&mut self) -> Vec<u8> {
        self.headers.set("content-length", &self.body.len().to_string());
        let mut out = Vec::new();
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(format!(" HTTP/{}.{}\r\n", self.version.major, self.version.minor).as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body.as_slice());
        out
    }
}

impl HttpResponse {
    pub fn parse<C: ReadBuffer>(cursor: &mut C) -> Result<Self, ParseResult> {
        prime(cursor)?;
        let version = parse_http_version(cursor)?;
        parse_sp(cursor)?;
        let status = parse_uint(cursor)?;
        if !(100..=599).contains(&status) {
            return Err(ParseResult::err(ParseError::InvalidRequestLine));
        }
        parse_sp(cursor)?;
        let reason = parse_reason_phrase(cursor)?;
        parse_crlf(cursor)?;
        let headers = parse_headers(cursor)?;
        let body = parse_body(cursor, &headers, true)?;
        Ok(Self { version, status: status as u16, reason, headers, body })
    }

    pub fn serialize(&mut self) -> Vec<u8> {
        self.headers.set("content-length", &self.body.len().to_string());
        let mut out = Vec::new();
        out.extend_from_slice(
            format!("HTTP/{}.{} {} {}\r\n", self.version.major, self.version.minor, self.status, self.reason)
                .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body.as_slice());
        out
    }
}

fn parse_reason_phrase<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    let mut out = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(b'\r') => break,
            Some(c) => {
                out.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_net::StringReadBuffer;

    #[test]
    fn parses_simple_get() {
        let mut c = StringReadBuffer::new(b"GET /path HTTP/1.1\r\nHost: example\r\n\r\n".to_vec());
        let req = HttpRequest::parse(&mut c).unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/path");
        assert_eq!(req.headers.get("host"), Some("example"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parses_content_length_body() {
        let mut c = StringReadBuffer::new(
            b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello".to_vec(),
        );
        let req = HttpRequest::parse(&mut c).unwrap();
        assert_eq!(req.body.as_slice(), b"hello");
    }

    #[test]
    fn parses_chunked_body() {
        let mut c = StringReadBuffer::new(
            b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n".to_vec(),
        );
        let req = HttpRequest::parse(&mut c).unwrap();
        assert_eq!(req.body.as_slice(), b"Wiki");
    }

    #[test]
    fn chunked_body_without_zero_terminator_is_invalid_last_chunk() {
        let mut c = StringReadBuffer::new(
            b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki".to_vec(),
        );
        match HttpRequest::parse(&mut c) {
            Err(r) => assert_eq!(r.error, ParseError::InvalidLastChunk),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn get_with_unexpected_body_is_rejected() {
        let mut c = StringReadBuffer::new(b"GET / HTTP/1.1\r\n\r\nstray".to_vec());
        match HttpRequest::parse(&mut c) {
            Err(r) => assert_eq!(r.error, ParseError::UnexpectedBody),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn truncated_request_is_incomplete() {
        let mut c = StringReadBuffer::new(b"GET / HTTP/1.1\r\nHost: ex".to_vec());
        match HttpRequest::parse(&mut c) {
            Err(r) => assert_eq!(r.error, ParseError::Incomplete),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn parses_response_status_line() {
        let mut c = StringReadBuffer::new(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec());
        let resp = HttpResponse::parse(&mut c).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
    }
}
