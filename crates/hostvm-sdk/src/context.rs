//! Runtime services available to library initializers

use crate::error::ApiError;
use crate::value::Value;
use std::fmt;

/// Opaque handle to a library loaded in an isolate
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryHandle(u64);

impl LibraryHandle {
    /// Wrap a runtime-assigned handle value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LibraryHandle({})", self.0)
    }
}

/// The slice of the interpreter a library initializer may use.
///
/// Calls operate on the isolate whose scope is currently entered.
pub trait LibraryContext {
    /// Find an already loaded library by URL
    fn lookup_library(&self, url: &str) -> Result<Option<LibraryHandle>, ApiError>;

    /// Invoke a top-level function of a library
    fn invoke(
        &self,
        library: LibraryHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, ApiError>;
}
