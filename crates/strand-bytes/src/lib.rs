mod buffer;
mod error;

pub use buffer::{MatchType, OctetBuffer};
pub use error::Error;
