//! Script library descriptors
//!
//! A [`ScriptLibrary`] names a library the host can provide to scripts:
//! where its source comes from and, optionally, the native capability that
//! backs its `native` declarations. The same descriptor serves every
//! isolate; each isolate gets its own load.

use crate::error::LoadError;
use crate::runtime::{IsolateHandle, ScriptRuntime};
use crate::source::{LibrarySource, SourceProvider};
use hostvm_sdk::{fnv1a_hash, LibraryHandle, NativeLibrary};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-provided script library
pub struct ScriptLibrary {
    name: String,
    hashed_name: u32,
    source: Option<LibrarySource>,
    native: Option<Arc<dyn NativeLibrary>>,
    loaded: Mutex<HashMap<IsolateHandle, LibraryHandle>>,
}

impl ScriptLibrary {
    /// Describe a library. `source` may be `None` for snapshot libraries.
    pub fn new(
        name: impl Into<String>,
        source: Option<LibrarySource>,
        native: Option<Arc<dyn NativeLibrary>>,
    ) -> Self {
        let name = name.into();
        Self {
            hashed_name: fnv1a_hash(&name),
            name,
            source,
            native,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Library URL
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier hash of the name
    pub fn hashed_name(&self) -> u32 {
        self.hashed_name
    }

    /// Registered source, if any
    pub fn source(&self) -> Option<&LibrarySource> {
        self.source.as_ref()
    }

    /// Native capability, if any
    pub fn native(&self) -> Option<&Arc<dyn NativeLibrary>> {
        self.native.as_ref()
    }

    /// Handle produced for an isolate, if loaded there
    pub fn loaded_in(&self, isolate: IsolateHandle) -> Option<LibraryHandle> {
        self.loaded.lock().get(&isolate).copied()
    }

    /// Make the library available in the current isolate.
    ///
    /// A library already in the isolate (from the snapshot or an earlier
    /// load) is reused. Otherwise the registered source is compiled. The
    /// native resolver is attached and the initializer run once per
    /// isolate; if the initializer fails the resolver is detached again.
    pub fn load(
        &self,
        runtime: &dyn ScriptRuntime,
        sources: &dyn SourceProvider,
    ) -> Result<LibraryHandle, LoadError> {
        let isolate = runtime.current_isolate().ok_or_else(|| LoadError::NoIsolate {
            library: self.name.clone(),
        })?;
        if let Some(handle) = self.loaded_in(isolate) {
            return Ok(handle);
        }

        let existing = runtime
            .lookup_library(&self.name)
            .map_err(|source| self.runtime_error(source))?;
        let library = match existing {
            Some(handle) => handle,
            None => {
                let source = self.source.as_ref().ok_or_else(|| LoadError::MissingSource {
                    library: self.name.clone(),
                })?;
                let text = source.read(sources).map_err(|source| LoadError::Source {
                    library: self.name.clone(),
                    source,
                })?;
                debug!(library = self.name.as_str(), "compiling library");
                let library = runtime
                    .load_library(&self.name, &text)
                    .map_err(|source| self.runtime_error(source))?;
                // A cyclic import may have finished a nested load already.
                if let Some(handle) = self.loaded_in(isolate) {
                    return Ok(handle);
                }
                library
            }
        };

        if let Some(native) = &self.native {
            runtime
                .set_native_resolver(library, Some(Arc::clone(native)))
                .map_err(|source| LoadError::Resolver {
                    library: self.name.clone(),
                    source,
                })?;
            if let Err(source) = native.initialize(runtime, library) {
                if let Err(e) = runtime.set_native_resolver(library, None) {
                    warn!(library = self.name.as_str(), error = %e, "failed to detach resolver");
                }
                return Err(LoadError::Initializer {
                    library: self.name.clone(),
                    source,
                });
            }
        }

        self.loaded.lock().insert(isolate, library);
        debug!(library = self.name.as_str(), ?isolate, "library loaded");
        Ok(library)
    }

    /// Drop the load record of an isolate that is gone
    pub fn forget_isolate(&self, isolate: IsolateHandle) {
        self.loaded.lock().remove(&isolate);
    }

    fn runtime_error(&self, source: hostvm_sdk::ApiError) -> LoadError {
        LoadError::Runtime {
            library: self.name.clone(),
            source,
        }
    }
}

impl fmt::Debug for ScriptLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLibrary")
            .field("name", &self.name)
            .field("hashed_name", &format_args!("{:#010x}", self.hashed_name))
            .field("source", &self.source)
            .field("native", &self.native.is_some())
            .finish()
    }
}
