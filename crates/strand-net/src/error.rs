use thiserror::Error;

/// Errors surfaced by [`crate::socket::BaseSocket`] and connect/accept calls.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation would block")]
    WouldBlock,
    #[error("address already in use")]
    AddressInUse,
    #[error("connection refused")]
    Refused,
    #[error("network unreachable")]
    NetUnreachable,
    #[error("operation timed out")]
    TimedOut,
    #[error("permission denied")]
    PermissionDenied,
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("endpoint is invalid")]
    InvalidEndpoint,
    #[error("system error: {0}")]
    System(#[from] std::io::Error),
}

impl Error {
    /// Classify a raw `connect(2)`-style OS error into the typed taxonomy.
    pub fn from_connect_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => Error::WouldBlock,
            std::io::ErrorKind::AddrInUse => Error::AddressInUse,
            std::io::ErrorKind::ConnectionRefused => Error::Refused,
            std::io::ErrorKind::TimedOut => Error::TimedOut,
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            _ => match err.raw_os_error() {
                Some(libc::ENETUNREACH) => Error::NetUnreachable,
                _ => Error::System(err),
            },
        }
    }
}
