use std::net::TcpStream;

use bitflags::bitflags;
use mio::Token;

bitflags! {
    /// Where a connection sits in the accept → dispatch → release cycle.
    ///
    /// A poller wakeup can report more than one condition on the same
    /// socket at once — readable and hung-up in the same event, say — so
    /// this is a set, not a single variant: a [`WorkUnit`] carries every
    /// flag the event implied, and a worker runs the corresponding hook for
    /// each one it finds set, in `New` → `Read` → `Shut` order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SockState: u8 {
        /// Freshly accepted; the handler's `handshake` runs.
        const NEW = 1 << 0;
        /// Readable per the poller; the handler's `request_response` runs.
        const READ = 1 << 1;
        /// Hung up or in error; the handler's `shutdown` runs.
        const SHUT = 1 << 2;
    }
}

/// A connection handed from the acceptor thread to a worker thread, paired
/// with the reason it was handed over.
pub struct WorkUnit {
    pub token: Token,
    pub stream: TcpStream,
    pub state: SockState,
}

/// What a worker tells the acceptor to do with a connection once it's done
/// handling one [`WorkUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Resume event-driven monitoring of this connection.
    Continue,
    /// The handler is done with this connection (or it errored); close it.
    Shut,
}

/// A connection handed back from a worker thread to the acceptor thread.
pub struct Handback {
    pub token: Token,
    pub stream: TcpStream,
    pub outcome: HandlerOutcome,
}
