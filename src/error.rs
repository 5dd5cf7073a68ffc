
pub type Result<T> = std::result::Result<T, Error>;
pub type PassiveResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// All errors the library surfaces to a caller.
///
/// Substreams that merely cannot be transformed are not errors: the forward
/// pass marks them as passthrough and carries on. An `Error` means the call
/// itself cannot complete — the underlying stream failed, the reference
/// engine could not be set up, or the reverse pass met framing it is unable
/// to reconstruct (which the forward pass guarantees never to emit).
#[derive(Debug)]
pub enum Error {
    NotSupported(String),
    Invalid(String),

    /// This error can also occur when reading truncated input,
    /// where the number of bytes to read does not match the stream length.
    Io(IoError),
}


impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }
}


/// Enable using the `?` operator on io::Result
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid content: {}", message),
            Error::Io(error) => write!(formatter, "io error: {}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}
