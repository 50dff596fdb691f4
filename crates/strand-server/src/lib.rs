mod acceptor;
mod config;
mod error;
mod handler;
mod shared;
mod state;
mod worker;

pub use acceptor::Acceptor;
pub use config::ListenerConfig;
pub use error::Error;
pub use handler::{ConnectionHandler, HandlerFactory};
pub use state::{Handback, HandlerOutcome, SockState, WorkUnit};
