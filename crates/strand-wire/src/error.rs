use strand_net::CursorError;

/// Parse errors for the fragment grammar shared by the HTTP and STOMP
/// parsers. `Ok` is a real variant so a [`ParseResult`] can be returned by
/// value all the way down the call stack instead of threading an extra
/// success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Ok,
    Incomplete,
    ExpectCRLF,
    UnfinishedToken,
    ExpectingColon,
    InvalidFieldValue,
    InvalidHeaderListEnd,
    InvalidMethod,
    InvalidVersion,
    InvalidRequestLine,
    InvalidContentLength,
    UnexpectedBody,
    InvalidTransferEncoding,
    InvalidChunkHex,
    InvalidLastChunk,
    ExpectingUInt,
}

/// Why a parse came back incomplete, if it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemErrorKind {
    WouldBlock,
    Eof,
    Other(String),
}

/// The outcome of a parse attempt: a [`ParseError`] plus, for `Incomplete`,
/// the underlying cursor condition that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub error: ParseError,
    pub system_error: Option<SystemErrorKind>,
}

impl ParseResult {
    pub fn ok() -> Self {
        Self { error: ParseError::Ok, system_error: None }
    }

    pub fn incomplete() -> Self {
        Self { error: ParseError::Incomplete, system_error: None }
    }

    pub fn err(error: ParseError) -> Self {
        Self { error, system_error: None }
    }

    pub fn is_ok(&self) -> bool {
        self.error == ParseError::Ok
    }

    /// True if the cursor ran out because the source is permanently
    /// exhausted rather than merely out of data for now.
    pub fn is_eof(&self) -> bool {
        matches!(self.system_error, Some(SystemErrorKind::Eof))
    }

    pub fn from_cursor_error(e: CursorError) -> Self {
        match e {
            CursorError::WouldBlock => Self {
                error: ParseError::Incomplete,
                system_error: Some(SystemErrorKind::WouldBlock),
            },
            CursorError::Eof => Self {
                error: ParseError::Incomplete,
                system_error: Some(SystemErrorKind::Eof),
            },
            CursorError::System(e) => Self {
                error: ParseError::Incomplete,
                system_error: Some(SystemErrorKind::Other(e.to_string())),
            },
        }
    }
}
