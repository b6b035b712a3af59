//! Native library capability
//!
//! A library that declares native functions hands the engine one
//! [`NativeLibrary`]. The engine attaches it as the library's resolver and
//! calls [`NativeLibrary::initialize`] once after attaching it.

use crate::context::{LibraryContext, LibraryHandle};
use crate::error::{ApiError, TableError};
use crate::native::NativeFn;
use crate::table::NativeTable;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Native resolver and one-time initializer of a script library
pub trait NativeLibrary: Send + Sync {
    /// Resolve a native call identifier to a host function.
    ///
    /// # Panics
    /// Implementations backed by a [`NativeTable`] panic on an argument-count
    /// mismatch.
    fn resolve(&self, identifier: &str, argument_count: usize) -> Option<NativeFn>;

    /// One-time setup after the resolver is attached
    fn initialize(&self, _ctx: &dyn LibraryContext, _library: LibraryHandle) -> Result<(), ApiError> {
        Ok(())
    }

    /// Registered `(identifier, argument count)` pairs for diagnostics
    fn entries(&self) -> Vec<(String, usize)> {
        Vec::new()
    }
}

/// Library initializer closure
pub type Initializer =
    Arc<dyn Fn(&dyn LibraryContext, LibraryHandle) -> Result<(), ApiError> + Send + Sync>;

type TableDefinition = Box<dyn Fn() -> Result<NativeTable, TableError> + Send + Sync>;

/// [`NativeLibrary`] backed by a lazily built [`NativeTable`].
///
/// The table is built on first use and reused for the life of the value.
pub struct TableLibrary {
    name: String,
    define: TableDefinition,
    table: OnceCell<NativeTable>,
    initializer: Option<Initializer>,
}

impl TableLibrary {
    /// Create a library whose table is produced by `define` on first use
    pub fn new<F>(name: impl Into<String>, define: F) -> Self
    where
        F: Fn() -> Result<NativeTable, TableError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            define: Box::new(define),
            table: OnceCell::new(),
            initializer: None,
        }
    }

    /// Attach an initializer
    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&dyn LibraryContext, LibraryHandle) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    /// Library name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table, building it if needed
    pub fn table(&self) -> Result<&NativeTable, TableError> {
        self.table.get_or_try_init(|| (self.define)())
    }

    /// Whether the table has been built
    pub fn is_built(&self) -> bool {
        self.table.get().is_some()
    }
}

impl NativeLibrary for TableLibrary {
    fn resolve(&self, identifier: &str, argument_count: usize) -> Option<NativeFn> {
        match self.table() {
            Ok(table) => table.resolve(identifier, argument_count),
            Err(e) => {
                error!(library = self.name.as_str(), error = %e, "native table failed to build");
                None
            }
        }
    }

    fn initialize(&self, ctx: &dyn LibraryContext, library: LibraryHandle) -> Result<(), ApiError> {
        match &self.initializer {
            Some(init) => init(ctx, library),
            None => Ok(()),
        }
    }

    fn entries(&self) -> Vec<(String, usize)> {
        self.table().map(NativeTable::entries).unwrap_or_default()
    }
}

impl fmt::Debug for TableLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLibrary")
            .field("name", &self.name)
            .field("built", &self.is_built())
            .field("has_initializer", &self.initializer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoRuntime;

    impl LibraryContext for NoRuntime {
        fn lookup_library(&self, _url: &str) -> Result<Option<LibraryHandle>, ApiError> {
            Ok(None)
        }

        fn invoke(&self, _: LibraryHandle, function: &str, _: Vec<Value>) -> Result<Value, ApiError> {
            Err(ApiError::new(format!("no function {}", function)))
        }
    }

    #[test]
    fn test_table_built_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let library = TableLibrary::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            NativeTable::builder()
                .class("Foo", |c| c.method("Bar", 2, |_| Ok(Value::Null)))
                .build()
        });

        assert!(!library.is_built());
        assert!(library.resolve("Foo_Bar", 2).is_some());
        assert!(library.resolve("Foo_Baz", 2).is_none());
        assert_eq!(library.entries(), vec![("Foo_Bar".to_string(), 2)]);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broken_table_resolves_nothing() {
        let library = TableLibrary::new("broken", || {
            NativeTable::builder()
                .function("Exit", 1, |_| Ok(Value::Null))
                .function("Exit", 1, |_| Ok(Value::Null))
                .build()
        });
        assert!(library.resolve("Exit", 1).is_none());
        assert!(library.entries().is_empty());
    }

    #[test]
    fn test_initializer() {
        let plain = TableLibrary::new("plain", || Ok(NativeTable::default()));
        assert!(plain.initialize(&NoRuntime, LibraryHandle::new(1)).is_ok());

        let failing = TableLibrary::new("failing", || Ok(NativeTable::default()))
            .with_initializer(|ctx, lib| ctx.invoke(lib, "_setup", Vec::new()).map(|_| ()));
        let err = failing
            .initialize(&NoRuntime, LibraryHandle::new(1))
            .unwrap_err();
        assert_eq!(err.message, "no function _setup");
    }
}
