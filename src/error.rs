use std::fmt::Display;

/// TandemKV errors.
///
/// "Not found" is never an error: point lookups return `Option` and range
/// scans return what they found. A broken internal invariant is a bug and
/// panics instead of surfacing here.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A configuration value was rejected during engine or workload
    /// construction.
    InvalidConfig(String),
    /// An OS-level failure, e.g. spawning a background worker thread.
    Io(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidConfig for the given format string.
#[macro_export]
macro_rules! errconfig {
    ($($args:tt)*) => { $crate::error::Error::InvalidConfig(format!($($args)*)) };
}

/// A TandemKV Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
