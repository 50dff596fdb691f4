pub mod cursor;
mod error;
mod http;
pub mod stomp;

pub use error::{ParseError, ParseResult, SystemErrorKind};
pub use http::{HeaderMap, HttpRequest, HttpResponse, HttpVersion, Method};
