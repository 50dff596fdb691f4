mod endpoint;
mod error;
mod icmp;
mod readbuffer;
mod socket;

pub use endpoint::Endpoint;
pub use error::Error;
pub use icmp::IcmpSocket;
pub use readbuffer::{CursorError, FileReadBuffer, ReadBuffer, SocketReadBuffer, StringReadBuffer};
pub use socket::{BaseSocket, Family, Kind};
