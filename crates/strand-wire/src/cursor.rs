use strand_net::ReadBuffer;

use crate::error::{ParseError, ParseResult};

/// RFC 7230 `separators`, plus horizontal tab, used to delimit a `token`.
const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";

/// Bring a freshly constructed cursor to its first octet. A no-op if the
/// cursor has already seen at least one `advance`.
pub fn prime<C: ReadBuffer>(cursor: &mut C) -> Result<(), ParseResult> {
    if cursor.peek().is_none() {
        cursor.advance().map_err(ParseResult::from_cursor_error)?;
    }
    Ok(())
}

/// Consume a run of spaces and horizontal tabs, if any.
pub fn eat_space<C: ReadBuffer>(cursor: &mut C) -> Result<(), ParseResult> {
    loop {
        match cursor.peek() {
            Some(b' ') | Some(b'\t') => {
                cursor.advance().map_err(ParseResult::from_cursor_error)?
            }
            Some(_) => return Ok(()),
            None => return Err(ParseResult::incomplete()),
        }
    }
}

/// A strict CRLF: anything else at the current position is `ExpectCRLF`.
pub fn parse_crlf<C: ReadBuffer>(cursor: &mut C) -> Result<(), ParseResult> {
    match cursor.peek() {
        Some(b'\r') => cursor.advance().map_err(ParseResult::from_cursor_error)?,
        Some(_) => return Err(ParseResult::err(ParseError::ExpectCRLF)),
        None => return Err(ParseResult::incomplete()),
    }
    match cursor.peek() {
        Some(b'\n') => {
            cursor.advance().map_err(ParseResult::from_cursor_error)?;
            Ok(())
        }
        Some(_) => Err(ParseResult::err(ParseError::ExpectCRLF)),
        None => Err(ParseResult::incomplete()),
    }
}

/// Consume a CRLF if one is present at the current position; otherwise a
/// no-op. Used where a terminator is optional.
pub fn eat_crlf<C: ReadBuffer>(cursor: &mut C) -> Result<(), ParseResult> {
    if cursor.peek() == Some(b'\r') {
        parse_crlf(cursor)?;
    }
    Ok(())
}

/// A `token`: a run of non-separator, non-control octets. Stops (without
/// consuming) at the first separator or control octet.
pub fn parse_token<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    let mut token = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(c) if SEPARATORS.contains(&c) || c.is_ascii_control() => break,
            Some(c) => {
                token.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    String::from_utf8(token).map_err(|_| ParseResult::err(ParseError::UnfinishedToken))
}

/// Everything up to (but not consuming) the next space or CR. Used for
/// request-targets, which are far more permissive than a `token`.
pub fn parse_until_space<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    let mut out = Vec::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(b' ') | Some(b'\r') => break,
            Some(c) if c.is_ascii_control() => {
                return Err(ParseResult::err(ParseError::InvalidRequestLine))
            }
            Some(c) => {
                out.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    String::from_utf8(out).map_err(|_| ParseResult::err(ParseError::InvalidRequestLine))
}

/// A single mandatory space.
pub fn parse_sp<C: ReadBuffer>(cursor: &mut C) -> Result<(), ParseResult> {
    match cursor.peek() {
        Some(b' ') => {
            cursor.advance().map_err(ParseResult::from_cursor_error)?;
            Ok(())
        }
        Some(_) => Err(ParseResult::err(ParseError::InvalidRequestLine)),
        None => Err(ParseResult::incomplete()),
    }
}

/// A header `field-value`: runs of SP/HT collapse to a single space,
/// including an obs-fold (CRLF followed by SP/HT). Consumes the
/// terminating CRLF itself, leaving the cursor at the start of the next
/// header line (or the blank line ending the header block).
pub fn parse_field_value<C: ReadBuffer>(cursor: &mut C) -> Result<String, ParseResult> {
    let mut value = String::new();
    loop {
        match cursor.peek() {
            None => return Err(ParseResult::incomplete()),
            Some(b' ') | Some(b'\t') => {
                loop {
                    cursor.advance().map_err(ParseResult::from_cursor_error)?;
                    match cursor.peek() {
                        Some(b' ') | Some(b'\t') => continue,
                        _ => break,
                    }
                }
                if !value.is_empty() {
                    value.push(' ');
                }
            }
            Some(b'\r') => {
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
                match cursor.peek() {
                    Some(b'\n') => {}
                    Some(_) => return Err(ParseResult::err(ParseError::ExpectCRLF)),
                    None => return Err(ParseResult::incomplete()),
                }
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
                match cursor.peek() {
                    Some(b' ') | Some(b'\t') => {
                        loop {
                            match cursor.peek() {
                                Some(b' ') | Some(b'\t') => {
                                    cursor.advance().map_err(ParseResult::from_cursor_error)?;
                                }
                                _ => break,
                            }
                        }
                        if !value.is_empty() {
                            value.push(' ');
                        }
                    }
                    _ => break,
                }
            }
            Some(c) if c.is_ascii_control() => {
                return Err(ParseResult::err(ParseError::InvalidFieldValue))
            }
            Some(c) => {
                value.push(c as char);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
        }
    }
    Ok(value.trim_end().to_string())
}

/// Hex chunk-size, terminated by a strict CRLF.
pub fn parse_chunk_hex<C: ReadBuffer>(cursor: &mut C) -> Result<usize, ParseResult> {
    let mut digits = Vec::new();
    loop {
        match cursor.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
            Some(_) => break,
            None => return Err(ParseResult::incomplete()),
        }
    }
    if digits.is_empty() {
        return Err(ParseResult::err(ParseError::InvalidChunkHex));
    }
    let text = std::str::from_utf8(&digits).expect("ascii hexdigits are valid utf8");
    let size = usize::from_str_radix(text, 16)
        .map_err(|_| ParseResult::err(ParseError::InvalidChunkHex))?;
    parse_crlf(cursor)?;
    Ok(size)
}

/// A run of decimal digits, e.g. `content-length`'s value.
pub fn parse_uint<C: ReadBuffer>(cursor: &mut C) -> Result<u64, ParseResult> {
    let mut digits = Vec::new();
    loop {
        match cursor.peek() {
            Some(c) if c.is_ascii_digit() => {
                digits.push(c);
                cursor.advance().map_err(ParseResult::from_cursor_error)?;
            }
            Some(_) => break,
            None => return Err(ParseResult::incomplete()),
        }
    }
    if digits.is_empty() {
        return Err(ParseResult::err(ParseError::ExpectingUInt));
    }
    let text = std::str::from_utf8(&digits).expect("ascii digits are valid utf8");
    text.parse().map_err(|_| ParseResult::err(ParseError::ExpectingUInt))
}

/// Read exactly `n` octets verbatim (no token semantics), used for message
/// bodies. A permanent EOF partway through is reported via `on_eof` rather
/// than as a bare `Incomplete`, since the caller usually knows a more
/// specific error for "the stream ended before the promised bytes arrived".
///
/// Consuming the `n`th octet never fails just because it was also the last
/// one the source had to offer — that's a complete read, not an underflow.
/// `advance` defers that discovery to whichever call next actually needs
/// another octet, so it only surfaces here when this function still has
/// bytes left to collect.
pub fn read_exact<C: ReadBuffer>(
    cursor: &mut C,
    n: usize,
    on_eof: ParseError,
) -> Result<Vec<u8>, ParseResult> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        match cursor.peek() {
            Some(c) => {
                out.push(c);
                match cursor.advance() {
                    Ok(()) => {}
                    Err(strand_net::CursorError::WouldBlock) => {
                        return Err(ParseResult::incomplete())
                    }
                    Err(strand_net::CursorError::Eof) => return Err(ParseResult::err(on_eof)),
                    Err(e) => return Err(ParseResult::from_cursor_error(e)),
                }
            }
            None => match cursor.advance() {
                Err(strand_net::CursorError::Eof) => return Err(ParseResult::err(on_eof)),
                Err(e) => return Err(ParseResult::from_cursor_error(e)),
                Ok(()) => return Err(ParseResult::incomplete()),
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_net::StringReadBuffer;

    fn primed(data: &str) -> StringReadBuffer {
        let mut c = StringReadBuffer::new(data.as_bytes().to_vec());
        prime(&mut c).unwrap();
        c
    }

    #[test]
    fn parses_token_up_to_separator() {
        let mut c = primed("GET ");
        assert_eq!(parse_token(&mut c).unwrap(), "GET");
    }

    #[test]
    fn field_value_folds_obs_fold_continuation() {
        let mut c = primed("a\r\n b\r\n");
        assert_eq!(parse_field_value(&mut c).unwrap(), "a b");
    }

    #[test]
    fn field_value_rejects_missing_lf() {
        let mut c = primed("a\rb");
        match parse_field_value(&mut c) {
            Err(r) => assert_eq!(r.error, ParseError::ExpectCRLF),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn chunk_hex_parses_and_consumes_crlf() {
        let mut c = primed("1a\r\nrest");
        assert_eq!(parse_chunk_hex(&mut c).unwrap(), 0x1a);
        assert_eq!(c.peek(), Some(b'r'));
    }

    #[test]
    fn uint_requires_at_least_one_digit() {
        let mut c = primed(" 5");
        match parse_uint(&mut c) {
            Err(r) => assert_eq!(r.error, ParseError::ExpectingUInt),
            Ok(_) => panic!("expected error"),
        }
    }
}
