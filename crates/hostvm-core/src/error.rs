//! Engine error types.

use hostvm_sdk::ApiError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading library or script source
#[derive(Debug, Error)]
pub enum SourceError {
    /// No file at the path
    #[error("Unable to read file '{}': not found", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read
    #[error("Unable to read file '{}': {source}", path.display())]
    Unreadable {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading a script library into an isolate
#[derive(Debug, Error)]
pub enum LoadError {
    /// No isolate is entered
    #[error("cannot load '{library}': no current isolate")]
    NoIsolate {
        /// Library name
        library: String,
    },

    /// Not in the snapshot and no source was registered
    #[error("library '{library}' has no source and is not in the snapshot")]
    MissingSource {
        /// Library name
        library: String,
    },

    /// The source could not be read
    #[error("library '{library}': {source}")]
    Source {
        /// Library name
        library: String,
        /// Read failure
        #[source]
        source: SourceError,
    },

    /// The interpreter rejected the library
    #[error("library '{library}': {source}")]
    Runtime {
        /// Library name
        library: String,
        /// Interpreter diagnostic
        #[source]
        source: ApiError,
    },

    /// The native resolver could not be attached
    #[error("library '{library}': cannot attach native resolver: {source}")]
    Resolver {
        /// Library name
        library: String,
        /// Interpreter diagnostic
        #[source]
        source: ApiError,
    },

    /// The library initializer failed
    #[error("library '{library}': initializer failed: {source}")]
    Initializer {
        /// Library name
        library: String,
        /// Interpreter diagnostic
        #[source]
        source: ApiError,
    },
}

/// Errors registering a script library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is already registered
    #[error("library '{0}' is already registered")]
    Duplicate(String),

    /// Two names share an identifier hash
    #[error("library names '{existing}' and '{incoming}' share hash {hash:#010x}")]
    HashCollision {
        /// Registered name
        existing: String,
        /// Name being registered
        incoming: String,
        /// The shared hash
        hash: u32,
    },

    /// `dart:` names belong to the builtin set
    #[error("library '{0}' uses the reserved 'dart:' scheme")]
    ReservedScheme(String),
}

/// Step of isolate creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolateStage {
    /// Creating the runtime isolate from the snapshot
    CreateIsolate,
    /// Installing the library tag handler
    SetTagHandler,
    /// Loading `dart:uri`
    LoadUriLibrary,
    /// Loading `dart:builtin`
    LoadCoreLibrary,
    /// Loading `dart:io`
    LoadIoLibrary,
    /// Resolving, reading and compiling the script
    LoadScript,
    /// Importing the core library into the script
    ImportCore,
}

impl fmt::Display for IsolateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolateStage::CreateIsolate => "create isolate",
            IsolateStage::SetTagHandler => "set library tag handler",
            IsolateStage::LoadUriLibrary => "load uri library",
            IsolateStage::LoadCoreLibrary => "load core library",
            IsolateStage::LoadIoLibrary => "load io library",
            IsolateStage::LoadScript => "load script",
            IsolateStage::ImportCore => "import core library",
        };
        f.write_str(name)
    }
}

/// Errors creating or driving an isolate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsolateError {
    /// Creation failed; the runtime isolate has been shut down
    #[error("isolate creation failed ({stage}): {message}")]
    Stage {
        /// Failing step
        stage: IsolateStage,
        /// Diagnostic, including the interpreter's text
        message: String,
    },

    /// Invoking a function failed
    #[error("invoking '{function}' failed: {source}")]
    Invoke {
        /// Function name
        function: String,
        /// Interpreter diagnostic
        #[source]
        source: ApiError,
    },

    /// The runtime refused to enter or shut down the isolate
    #[error("{0}")]
    Runtime(#[from] ApiError),
}

impl IsolateError {
    pub(crate) fn stage(stage: IsolateStage, message: impl fmt::Display) -> Self {
        IsolateError::Stage {
            stage,
            message: message.to_string(),
        }
    }

    /// Failing creation step, if any
    pub fn failed_stage(&self) -> Option<IsolateStage> {
        match self {
            IsolateError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Errors loading the VM configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Semantic check failed
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// VM lifecycle errors
#[derive(Debug, Error)]
pub enum VmError {
    /// `initialize` has not been called
    #[error("VM is not initialized")]
    NotInitialized,

    /// Interpreter failure during startup
    #[error("Runtime error: {0}")]
    Runtime(#[from] ApiError),

    /// Library registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Isolate creation or invocation failed
    #[error(transparent)]
    Isolate(#[from] IsolateError),

    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The snapshot file could not be read
    #[error("Failed to read snapshot '{}': {source}", path.display())]
    Snapshot {
        /// Snapshot path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The working directory could not be determined
    #[error("Failed to determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}
