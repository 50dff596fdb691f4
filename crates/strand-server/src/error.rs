use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("couldn't set up poll: {0}")]
    Poll(#[source] std::io::Error),
    #[error("system error: {0}")]
    System(#[from] std::io::Error),
}
