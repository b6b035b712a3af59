//! Error types for the host SDK

use thiserror::Error;

/// Result type returned by native functions
pub type NativeResult = Result<crate::value::Value, NativeError>;

/// Errors produced while hashing a native call identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// No `_` separates the class and method names
    #[error("native identifier '{0}' has no '_' separator")]
    MissingSeparator(String),

    /// Nothing precedes the first `_`
    #[error("native identifier '{0}' has an empty class name")]
    EmptyClass(String),

    /// Nothing follows the first `_`
    #[error("native identifier '{0}' has an empty method name")]
    EmptyMethod(String),
}

/// Errors produced while building a native symbol table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The same name was registered twice at one level
    #[error("native '{0}' is registered more than once")]
    Duplicate(String),

    /// Two different names hash to the same value at one level
    #[error("native names '{existing}' and '{incoming}' share hash {hash:#010x}")]
    HashCollision {
        /// Name already in the table
        existing: String,
        /// Name being added
        incoming: String,
        /// The shared hash
        hash: u32,
    },

    /// Class name is empty or contains the call separator
    #[error("invalid native class name '{0}'")]
    InvalidClassName(String),
}

/// Error reported by the interpreter runtime.
///
/// The message is the interpreter's own diagnostic text and is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Interpreter diagnostic
    pub message: String,
}

impl ApiError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors raised by native functions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// Argument has the wrong type
    #[error("argument {index}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Argument position
        index: usize,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        got: &'static str,
    },

    /// Argument position is past the end of the argument list
    #[error("argument {0} is out of range")]
    MissingArgument(usize),

    /// Integer argument does not fit the host type
    #[error("argument {index}: {value} is out of range")]
    IntegerRange {
        /// Argument position
        index: usize,
        /// Value passed by the script
        value: i64,
    },

    /// Instance has no native peer of the requested type
    #[error("argument {0} has no native peer of the expected type")]
    MissingPeer(usize),

    /// Unknown or closed resource handle
    #[error("invalid handle: {0}")]
    InvalidHandle(i64),

    /// Operating system error
    #[error("{0}")]
    Os(String),

    /// Operation is not provided by this host
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
}

impl From<std::io::Error> for NativeError {
    fn from(err: std::io::Error) -> Self {
        NativeError::Os(err.to_string())
    }
}
