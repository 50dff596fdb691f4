use std::net::TcpStream;

use crate::state::HandlerOutcome;

/// Implements a request-response protocol on top of the acceptor's
/// connection management. For a given connection, a handler cycles through
/// a `handshake` call, zero or more `request_response` calls, and a
/// `shutdown` call.
///
/// Every method runs on a worker thread with the socket in blocking mode;
/// `request_response` is only invoked once the poller has observed the
/// socket readable, so a blocking read there will not stall waiting for
/// data that never arrives.
pub trait ConnectionHandler: Send {
    /// Called once, right after accept.
    fn handshake(&mut self, stream: &mut TcpStream) -> HandlerOutcome;

    /// Called each time the socket becomes readable.
    fn request_response(&mut self, stream: &mut TcpStream) -> HandlerOutcome;

    /// Called once the connection is being torn down, whether due to a
    /// handler request, a peer hangup, or a socket error. The stream is
    /// still open, so implementations can flush or log before it closes.
    fn shutdown(&mut self, stream: &mut TcpStream);
}

/// Constructs a fresh [`ConnectionHandler`] for each accepted connection.
/// Implemented as a factory (rather than handing out one shared handler)
/// so worker threads never contend on handler state.
pub trait HandlerFactory: Send + Sync {
    type Handler: ConnectionHandler;

    fn make(&self) -> Self::Handler;
}
