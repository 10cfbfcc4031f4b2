/*!
One error type for the whole client, with `From` impls for the handful of
foreign errors we bump into.
*/
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    /// Bad user input; the text is shown to the user as-is.
    Validation(&'static str),
    /// Tried to talk in the room without having joined it.
    NotJoined,
    /// An inbound message we couldn't make sense of.
    BadMessage(String),
    Config(String),
    IOError(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "{}", msg),
            Error::NotJoined => write!(f, "Please join the room first"),
            Error::BadMessage(msg) => write!(f, "bad message format {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IOError(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::BadMessage(e.to_string())
    }
}
