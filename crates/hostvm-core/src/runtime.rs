//! The interpreter boundary
//!
//! [`ScriptRuntime`] is everything the engine needs from a script
//! interpreter. Calls operate on the *current* isolate of the calling
//! thread: `create_isolate` makes the new isolate current, `enter_isolate`
//! and `exit_isolate` switch it explicitly.
//!
//! Interpreter failures come back as [`ApiError`] and are passed on without
//! rewriting the message.

use hostvm_sdk::{ApiError, LibraryContext, LibraryHandle, NativeLibrary};
use std::fmt;
use std::sync::Arc;

/// Opaque handle to an isolate inside the runtime
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateHandle(u64);

impl IsolateHandle {
    /// Wrap a runtime-assigned handle value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for IsolateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IsolateHandle({})", self.0)
    }
}

/// Kind of request passed to the library tag handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryTag {
    /// Turn an import URL into its canonical form
    CanonicalizeUrl,
    /// Produce the library behind an import
    Import,
    /// Produce the library behind a source include
    Source,
}

/// Answer of the library tag handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagResult {
    /// Canonical URL
    Url(String),
    /// Loaded library
    Library(LibraryHandle),
}

/// Callback the runtime consults for every import in a script
pub type LibraryTagHandler =
    Arc<dyn Fn(LibraryTag, Option<LibraryHandle>, &str) -> Result<TagResult, ApiError> + Send + Sync>;

/// Callbacks the runtime makes into the host
pub trait IsolateHooks: Send + Sync {
    /// A script asked for a new isolate. `spawner` is the isolate that asked.
    fn create_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        spawner: Option<IsolateHandle>,
    ) -> Result<IsolateHandle, ApiError>;

    /// An isolate is going away
    fn shutdown_isolate(&self, isolate: IsolateHandle);
}

/// Script interpreter embedding API
pub trait ScriptRuntime: LibraryContext + Send + Sync {
    /// Pass command-line style flags to the interpreter
    fn set_flags(&self, flags: &[String]) -> Result<(), ApiError>;

    /// One-time interpreter startup
    fn initialize(&self, hooks: Arc<dyn IsolateHooks>) -> Result<(), ApiError>;

    /// Create an isolate and make it current
    fn create_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        snapshot: Option<&[u8]>,
    ) -> Result<IsolateHandle, ApiError>;

    /// Isolate current on this thread
    fn current_isolate(&self) -> Option<IsolateHandle>;

    /// Make an isolate current
    fn enter_isolate(&self, isolate: IsolateHandle) -> Result<(), ApiError>;

    /// Leave the current isolate
    fn exit_isolate(&self);

    /// Shut down the current isolate. The runtime calls
    /// [`IsolateHooks::shutdown_isolate`] before it is gone.
    fn shutdown_isolate(&self);

    /// Open a handle scope
    fn enter_scope(&self);

    /// Close the innermost handle scope
    fn exit_scope(&self);

    /// Install the import callback of the current isolate
    fn set_library_tag_handler(&self, handler: LibraryTagHandler) -> Result<(), ApiError>;

    /// Compile a library from source
    fn load_library(&self, url: &str, source: &str) -> Result<LibraryHandle, ApiError>;

    /// Compile the root script of the current isolate
    fn load_script(&self, url: &str, source: &str) -> Result<LibraryHandle, ApiError>;

    /// Make `import`'s names visible inside `library`
    fn import_library(&self, library: LibraryHandle, import: LibraryHandle) -> Result<(), ApiError>;

    /// Attach or detach the native resolver of a library
    fn set_native_resolver(
        &self,
        library: LibraryHandle,
        resolver: Option<Arc<dyn NativeLibrary>>,
    ) -> Result<(), ApiError>;

    /// Drain the current isolate's message queue
    fn run_loop(&self) -> Result<(), ApiError>;
}

/// Handle scope, closed on drop
pub struct Scope<'a> {
    runtime: &'a dyn ScriptRuntime,
}

impl<'a> Scope<'a> {
    /// Open a scope on the current isolate
    pub fn enter(runtime: &'a dyn ScriptRuntime) -> Self {
        runtime.enter_scope();
        Self { runtime }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.runtime.exit_scope();
    }
}
