//! VM lifecycle
//!
//! ```ignore
//! let vm = VirtualMachine::new(runtime);
//! vm.initialize()?;
//! vm.load_script_library("embed:input", LibrarySource::Inline(src), Some(natives))?;
//! let isolate = vm.load_script("main.dart")?;
//! isolate.invoke_function("main")?;
//! vm.terminate();
//! ```

use crate::builtins::builtin_libraries;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::isolate::{Isolate, IsolateId, IsolateManager};
use crate::library::ScriptLibrary;
use crate::runtime::ScriptRuntime;
use crate::source::{FsSourceProvider, LibrarySource, SourceProvider};
use crate::VmResult;
use hostvm_sdk::NativeLibrary;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// The embedded script VM
pub struct VirtualMachine {
    config: VmConfig,
    manager: Arc<IsolateManager>,
    initialized: Mutex<bool>,
}

impl VirtualMachine {
    /// Create a VM with the default configuration
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::with_config(runtime, VmConfig::default())
    }

    /// Create a VM with a configuration, reading sources from disk
    pub fn with_config(runtime: Arc<dyn ScriptRuntime>, config: VmConfig) -> Self {
        Self::with_sources(runtime, config, Arc::new(FsSourceProvider))
    }

    /// Create a VM with a custom source provider
    pub fn with_sources(
        runtime: Arc<dyn ScriptRuntime>,
        config: VmConfig,
        sources: Arc<dyn SourceProvider>,
    ) -> Self {
        Self {
            config,
            manager: IsolateManager::new(runtime, sources),
            initialized: Mutex::new(false),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The isolate manager
    pub fn manager(&self) -> &Arc<IsolateManager> {
        &self.manager
    }

    /// Start the interpreter and install the builtin libraries.
    ///
    /// Does nothing when already initialized.
    pub fn initialize(&self) -> VmResult<()> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            debug!("VM already initialized");
            return Ok(());
        }

        let working_dir = match &self.config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(VmError::WorkingDir)?,
        };
        self.manager
            .set_working_dir(working_dir.to_string_lossy().into_owned());

        let snapshot = match &self.config.snapshot {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| VmError::Snapshot {
                    path: path.clone(),
                    source,
                })?;
                Some(Arc::from(bytes))
            }
            None => None,
        };

        // Stage on a copy; swapped in only after the runtime is up.
        let mut staged = self.manager.registry().read().clone();
        staged.set_builtins(builtin_libraries());
        for library in &self.config.libraries {
            staged.register(ScriptLibrary::new(
                library.name.clone(),
                Some(LibrarySource::File(library.path.clone())),
                None,
            ))?;
        }

        let runtime = self.manager.runtime();
        runtime.set_flags(&self.config.flags)?;
        runtime.initialize(self.manager.hooks())?;

        self.manager.set_snapshot(snapshot);
        *self.manager.registry().write() = staged;

        *initialized = true;
        info!(
            working_dir = %working_dir.display(),
            libraries = self.config.libraries.len(),
            "VM initialized"
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    /// Drop every library descriptor and forget every isolate.
    ///
    /// Running isolates are not shut down or waited for.
    pub fn terminate(&self) {
        let mut initialized = self.initialized.lock();
        self.manager.clear();
        self.manager.set_snapshot(None);
        if *initialized {
            info!("VM terminated");
        }
        *initialized = false;
    }

    /// Register a user library that scripts can import by `name`
    pub fn load_script_library(
        &self,
        name: impl Into<String>,
        source: LibrarySource,
        native: Option<Arc<dyn NativeLibrary>>,
    ) -> VmResult<()> {
        self.manager
            .registry()
            .write()
            .register(ScriptLibrary::new(name, Some(source), native))?;
        Ok(())
    }

    /// Number of running isolates
    pub fn number_of_isolates(&self) -> usize {
        self.manager.isolates().len()
    }

    /// Names of every registered library, builtins first
    pub fn library_names(&self) -> Vec<String> {
        self.manager
            .registry()
            .read()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    /// Start a top-level isolate for the script at `path`
    pub fn load_script(&self, path: &str) -> VmResult<Arc<Isolate>> {
        self.create_isolate(path, &self.config.entry_point, true, None)
    }

    /// Start an isolate
    pub fn create_isolate(
        &self,
        script_uri: &str,
        entry_point: &str,
        resolve_uri: bool,
        parent: Option<IsolateId>,
    ) -> VmResult<Arc<Isolate>> {
        if !self.is_initialized() {
            return Err(VmError::NotInitialized);
        }
        Ok(self
            .manager
            .create_isolate(script_uri, entry_point, resolve_uri, parent)?)
    }

    /// Look up a running isolate
    pub fn isolate(&self, id: IsolateId) -> Option<Arc<Isolate>> {
        self.manager.isolates().get(id)
    }
}
