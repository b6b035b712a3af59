//! Isolates and the isolate manager
//!
//! [`IsolateManager`] builds every isolate the same way, whether the host
//! asked for it or a running script spawned it:
//!
//! 1. create the runtime isolate from the snapshot
//! 2. install the library tag handler
//! 3. load `dart:uri`, `dart:builtin` and `dart:io`
//! 4. resolve, read and compile the script
//! 5. import `dart:builtin` into the script
//!
//! Any failure after step 1 closes the scope and shuts the runtime isolate
//! down, so a failed creation leaves nothing behind.

use crate::builtins::{
    BUILTIN_LIBRARY, DART_IO_LIBRARY, FILE_PATH_FROM_URI, RESOLVE_SCRIPT_URI, URI_LIBRARY,
};
use crate::error::{IsolateError, IsolateStage};
use crate::registry::{LibraryRegistry, BUILTIN_SCHEME};
use crate::runtime::{
    IsolateHandle, IsolateHooks, LibraryTag, LibraryTagHandler, Scope, ScriptRuntime, TagResult,
};
use crate::source::SourceProvider;
use hostvm_sdk::{ApiError, LibraryHandle, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

// ============================================================================
// Isolate
// ============================================================================

/// Host-side isolate identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateId(u64);

impl IsolateId {
    /// Raw id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate-{}", self.0)
    }
}

/// A running isolate and its root script library
pub struct Isolate {
    id: IsolateId,
    handle: IsolateHandle,
    library: LibraryHandle,
    script_uri: String,
    parent: Option<IsolateId>,
    runtime: Arc<dyn ScriptRuntime>,
}

impl Isolate {
    /// Host-side id
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// Runtime handle
    pub fn handle(&self) -> IsolateHandle {
        self.handle
    }

    /// Root script library
    pub fn library(&self) -> LibraryHandle {
        self.library
    }

    /// Resolved script URI
    pub fn script_uri(&self) -> &str {
        &self.script_uri
    }

    /// Isolate that spawned this one
    pub fn parent(&self) -> Option<IsolateId> {
        self.parent
    }

    /// Call a top-level function of the script, then drain the message loop
    pub fn invoke_function(&self, name: &str) -> Result<Value, IsolateError> {
        let _entered = Entered::enter(&*self.runtime, self.handle)?;
        let _scope = Scope::enter(&*self.runtime);
        let invoke_error = |source| IsolateError::Invoke {
            function: name.to_string(),
            source,
        };

        debug!(isolate = %self.id, function = name, "invoking");
        let result = self
            .runtime
            .invoke(self.library, name, Vec::new())
            .map_err(invoke_error)?;
        self.runtime.run_loop().map_err(invoke_error)?;
        Ok(result)
    }

    /// Shut the isolate down. The runtime's shutdown callback removes it
    /// from the manager.
    pub fn shutdown(&self) -> Result<(), IsolateError> {
        let previous = self.runtime.current_isolate();
        if previous != Some(self.handle) {
            if previous.is_some() {
                self.runtime.exit_isolate();
            }
            self.runtime.enter_isolate(self.handle)?;
        }

        info!(isolate = %self.id, uri = self.script_uri.as_str(), "shutting down isolate");
        self.runtime.shutdown_isolate();

        if let Some(previous) = previous.filter(|p| *p != self.handle) {
            self.runtime.enter_isolate(previous)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("library", &self.library)
            .field("script_uri", &self.script_uri)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Makes an isolate current for a while and restores the previous one
struct Entered<'a> {
    runtime: &'a dyn ScriptRuntime,
    previous: Option<IsolateHandle>,
    switched: bool,
}

impl<'a> Entered<'a> {
    fn enter(runtime: &'a dyn ScriptRuntime, isolate: IsolateHandle) -> Result<Self, IsolateError> {
        let previous = runtime.current_isolate();
        let switched = previous != Some(isolate);
        if switched {
            if previous.is_some() {
                runtime.exit_isolate();
            }
            if let Err(e) = runtime.enter_isolate(isolate) {
                restore(runtime, previous);
                return Err(e.into());
            }
        }
        Ok(Self {
            runtime,
            previous,
            switched,
        })
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        if self.switched {
            self.runtime.exit_isolate();
            restore(self.runtime, self.previous);
        }
    }
}

fn restore(runtime: &dyn ScriptRuntime, previous: Option<IsolateHandle>) {
    if let Some(previous) = previous {
        if let Err(e) = runtime.enter_isolate(previous) {
            warn!(?previous, error = %e, "failed to re-enter isolate");
        }
    }
}

// ============================================================================
// Isolate table
// ============================================================================

#[derive(Default)]
struct TableInner {
    by_id: HashMap<IsolateId, Arc<Isolate>>,
    by_handle: HashMap<IsolateHandle, IsolateId>,
}

/// Running isolates, indexed by id and by runtime handle
pub struct IsolateTable {
    inner: Mutex<TableInner>,
    next_id: AtomicU64,
}

impl IsolateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> IsolateId {
        IsolateId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, isolate: Arc<Isolate>) {
        let mut inner = self.inner.lock();
        inner.by_handle.insert(isolate.handle, isolate.id);
        inner.by_id.insert(isolate.id, isolate);
    }

    /// Look up an isolate
    pub fn get(&self, id: IsolateId) -> Option<Arc<Isolate>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    /// Id of the isolate behind a runtime handle
    pub fn id_for(&self, handle: IsolateHandle) -> Option<IsolateId> {
        self.inner.lock().by_handle.get(&handle).copied()
    }

    /// Remove the isolate behind a runtime handle
    pub fn remove_handle(&self, handle: IsolateHandle) -> Option<Arc<Isolate>> {
        let mut inner = self.inner.lock();
        let id = inner.by_handle.remove(&handle)?;
        inner.by_id.remove(&id)
    }

    /// Ids of every running isolate, oldest first
    pub fn ids(&self) -> Vec<IsolateId> {
        let mut ids: Vec<_> = self.inner.lock().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Isolates spawned by `parent`
    pub fn children(&self, parent: IsolateId) -> Vec<Arc<Isolate>> {
        let mut children: Vec<_> = self
            .inner
            .lock()
            .by_id
            .values()
            .filter(|i| i.parent == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|i| i.id);
        children
    }

    /// Number of running isolates
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// Whether no isolate is running
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every isolate
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_id.clear();
        inner.by_handle.clear();
    }
}

impl Default for IsolateTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Isolate manager
// ============================================================================

/// Creates isolates, answers library tag requests and tracks running isolates
pub struct IsolateManager {
    runtime: Arc<dyn ScriptRuntime>,
    sources: Arc<dyn SourceProvider>,
    registry: RwLock<LibraryRegistry>,
    isolates: IsolateTable,
    working_dir: RwLock<String>,
    snapshot: RwLock<Option<Arc<[u8]>>>,
    this: Weak<IsolateManager>,
}

impl IsolateManager {
    /// Create a manager over a runtime
    pub fn new(runtime: Arc<dyn ScriptRuntime>, sources: Arc<dyn SourceProvider>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            runtime,
            sources,
            registry: RwLock::new(LibraryRegistry::new()),
            isolates: IsolateTable::new(),
            working_dir: RwLock::new(String::new()),
            snapshot: RwLock::new(None),
            this: this.clone(),
        })
    }

    /// The runtime
    pub fn runtime(&self) -> &Arc<dyn ScriptRuntime> {
        &self.runtime
    }

    /// Library descriptors
    pub fn registry(&self) -> &RwLock<LibraryRegistry> {
        &self.registry
    }

    /// Running isolates
    pub fn isolates(&self) -> &IsolateTable {
        &self.isolates
    }

    /// Directory relative script URIs resolve against
    pub fn working_dir(&self) -> String {
        self.working_dir.read().clone()
    }

    /// Set the directory relative script URIs resolve against
    pub fn set_working_dir(&self, dir: impl Into<String>) {
        *self.working_dir.write() = dir.into();
    }

    /// Set the snapshot every new isolate starts from
    pub fn set_snapshot(&self, snapshot: Option<Arc<[u8]>>) {
        *self.snapshot.write() = snapshot;
    }

    /// Callbacks to hand to [`ScriptRuntime::initialize`]
    pub fn hooks(&self) -> Arc<dyn IsolateHooks> {
        Arc::new(ManagerHooks {
            manager: self.this.clone(),
        })
    }

    /// Library tag handler installed in every isolate
    pub fn tag_handler(&self) -> LibraryTagHandler {
        let manager = self.this.clone();
        Arc::new(move |tag, library, url| {
            let manager = manager
                .upgrade()
                .ok_or_else(|| ApiError::new("isolate manager is gone"))?;
            manager.handle_library_tag(tag, library, url)
        })
    }

    /// Create and register an isolate running `script_uri`.
    ///
    /// With `resolve_uri` the URI is resolved against the working directory
    /// by the core library first. The isolate is not left current.
    pub fn create_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        resolve_uri: bool,
        parent: Option<IsolateId>,
    ) -> Result<Arc<Isolate>, IsolateError> {
        let previous = self.runtime.current_isolate();
        if previous.is_some() {
            self.runtime.exit_isolate();
        }
        let result = self.build_isolate(script_uri, entry_point, resolve_uri, parent);
        restore(&*self.runtime, previous);
        result
    }

    fn build_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        resolve_uri: bool,
        parent: Option<IsolateId>,
    ) -> Result<Arc<Isolate>, IsolateError> {
        let snapshot = self.snapshot.read().clone();
        let handle = self
            .runtime
            .create_isolate(script_uri, entry_point, snapshot.as_deref())
            .map_err(|e| IsolateError::stage(IsolateStage::CreateIsolate, e))?;
        debug!(?handle, uri = script_uri, "runtime isolate created");

        let scope = Scope::enter(&*self.runtime);
        let prepared = self.prepare(script_uri, resolve_uri);
        drop(scope);

        let (library, resolved_uri) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(uri = script_uri, error = %e, "isolate creation failed");
                self.runtime.shutdown_isolate();
                self.release(handle);
                return Err(e);
            }
        };
        self.runtime.exit_isolate();

        let isolate = Arc::new(Isolate {
            id: self.isolates.next_id(),
            handle,
            library,
            script_uri: resolved_uri,
            parent,
            runtime: Arc::clone(&self.runtime),
        });
        self.isolates.insert(Arc::clone(&isolate));
        info!(isolate = %isolate.id, uri = isolate.script_uri.as_str(), parent = ?parent, "isolate created");
        Ok(isolate)
    }

    fn prepare(
        &self,
        script_uri: &str,
        resolve_uri: bool,
    ) -> Result<(LibraryHandle, String), IsolateError> {
        self.runtime
            .set_library_tag_handler(self.tag_handler())
            .map_err(|e| IsolateError::stage(IsolateStage::SetTagHandler, e))?;

        self.load_builtin(URI_LIBRARY, IsolateStage::LoadUriLibrary)?;
        let core = self.load_builtin(BUILTIN_LIBRARY, IsolateStage::LoadCoreLibrary)?;
        self.load_builtin(DART_IO_LIBRARY, IsolateStage::LoadIoLibrary)?;

        let (script, resolved_uri) = self
            .load_script(core, script_uri, resolve_uri)
            .map_err(|e| IsolateError::stage(IsolateStage::LoadScript, e))?;

        self.runtime
            .import_library(script, core)
            .map_err(|e| IsolateError::stage(IsolateStage::ImportCore, e))?;
        Ok((script, resolved_uri))
    }

    fn load_builtin(&self, url: &str, stage: IsolateStage) -> Result<LibraryHandle, IsolateError> {
        let descriptor = self
            .registry
            .read()
            .builtin(url)
            .ok_or_else(|| IsolateError::stage(stage, format!("library '{}' is not registered", url)))?;
        debug!(library = url, "loading builtin");
        descriptor
            .load(&*self.runtime, &*self.sources)
            .map_err(|e| IsolateError::stage(stage, e))
    }

    fn load_script(
        &self,
        core: LibraryHandle,
        script_uri: &str,
        resolve_uri: bool,
    ) -> Result<(LibraryHandle, String), String> {
        let is_windows = Value::Bool(cfg!(windows));
        let resolved = if resolve_uri {
            let cwd = self.working_dir();
            let value = self
                .runtime
                .invoke(
                    core,
                    RESOLVE_SCRIPT_URI,
                    vec![Value::String(cwd), Value::from(script_uri), is_windows.clone()],
                )
                .map_err(|e| e.to_string())?;
            expect_string(RESOLVE_SCRIPT_URI, value)?
        } else {
            script_uri.to_string()
        };

        let path = self
            .runtime
            .invoke(
                core,
                FILE_PATH_FROM_URI,
                vec![Value::String(resolved.clone()), is_windows],
            )
            .map_err(|e| e.to_string())?;
        let path = expect_string(FILE_PATH_FROM_URI, path)?;

        let source = self
            .sources
            .read_source(Path::new(&path))
            .map_err(|e| e.to_string())?;
        debug!(uri = resolved.as_str(), path = path.as_str(), "compiling script");
        let script = self
            .runtime
            .load_script(&resolved, &source)
            .map_err(|e| e.to_string())?;
        Ok((script, resolved))
    }

    /// Answer an import request from the runtime
    pub fn handle_library_tag(
        &self,
        tag: LibraryTag,
        _library: Option<LibraryHandle>,
        url: &str,
    ) -> Result<TagResult, ApiError> {
        let builtin = url.starts_with(BUILTIN_SCHEME);
        match tag {
            LibraryTag::CanonicalizeUrl => {
                if builtin || self.registry.read().library(url).is_some() {
                    return Ok(TagResult::Url(url.to_string()));
                }
            }
            LibraryTag::Import | LibraryTag::Source => {
                let descriptor = if builtin {
                    self.registry.read().builtin(url)
                } else {
                    self.registry.read().library(url)
                };
                if let Some(descriptor) = descriptor {
                    debug!(library = url, ?tag, "loading import");
                    return descriptor
                        .load(&*self.runtime, &*self.sources)
                        .map(TagResult::Library)
                        .map_err(|e| ApiError::new(e.to_string()));
                }
                if builtin {
                    if let Some(handle) = self.runtime.lookup_library(url)? {
                        return Ok(TagResult::Library(handle));
                    }
                }
            }
        }

        warn!(library = url, ?tag, "unknown library");
        Err(ApiError::new(format!("Do not know how to load '{}'", url)))
    }

    /// Forget an isolate that the runtime shut down
    pub fn release(&self, handle: IsolateHandle) {
        if let Some(isolate) = self.isolates.remove_handle(handle) {
            info!(isolate = %isolate.id, "isolate removed");
        }
        for library in self.registry.read().iter() {
            library.forget_isolate(handle);
        }
    }

    /// Drop every descriptor and forget every isolate
    pub fn clear(&self) {
        self.registry.write().clear();
        self.isolates.clear();
    }
}

impl fmt::Debug for IsolateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateManager")
            .field("isolates", &self.isolates.len())
            .field("working_dir", &*self.working_dir.read())
            .finish()
    }
}

fn expect_string(function: &str, value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(format!(
            "'{}' returned {}, expected a string",
            function,
            other.type_name()
        )),
    }
}

struct ManagerHooks {
    manager: Weak<IsolateManager>,
}

impl IsolateHooks for ManagerHooks {
    fn create_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        spawner: Option<IsolateHandle>,
    ) -> Result<IsolateHandle, ApiError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| ApiError::new("isolate manager is gone"))?;
        let parent = spawner.and_then(|h| manager.isolates.id_for(h));
        manager
            .create_isolate(script_uri, entry_point, true, parent)
            .map(|isolate| isolate.handle())
            .map_err(|e| ApiError::new(e.to_string()))
    }

    fn shutdown_isolate(&self, isolate: IsolateHandle) {
        if let Some(manager) = self.manager.upgrade() {
            manager.release(isolate);
        }
    }
}
