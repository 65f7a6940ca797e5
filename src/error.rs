use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    Decode(&'static str, io::Error),
    Corrupted(String),
    ProductMismatch(String, String),
    UnknownMessage(u8),
    LockError(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Decode(field, err) => write!(f, "Failed to decode {}: {}", field, err),
            Error::Corrupted(msg) => write!(f, "Corrupted file: {}", msg),
            Error::ProductMismatch(a, b) => {
                write!(f, "Cannot combine aggregations for {} and {}", a, b)
            }
            Error::UnknownMessage(code) => write!(f, "Unknown message type: {}", code),
            Error::LockError(err) => write!(f, "Failed to lock data directory: {}", err),
        }
    }
}

impl std::error::Error for Error {}
