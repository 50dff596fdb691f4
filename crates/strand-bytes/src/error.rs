use thiserror::Error;

/// Errors raised by [`crate::OctetBuffer`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("buffer contains an embedded NUL octet other than as its last byte")]
    InvalidContent,
    #[error("base64 payload is malformed")]
    InvalidBase64,
}
