//! HostVM engine
//!
//! This crate embeds a script interpreter behind the [`ScriptRuntime`]
//! boundary and manages:
//! - the builtin `dart:` libraries and host-registered script libraries
//! - isolate creation, the library tag handler and the isolate table
//! - the VM lifecycle ([`VirtualMachine`])
//! - configuration ([`VmConfig`])

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builtins;
pub mod config;
pub mod error;
pub mod isolate;
pub mod library;
pub mod registry;
pub mod runtime;
pub mod source;
#[cfg(feature = "testing")]
pub mod testing;
pub mod vm;

pub use config::{LibraryConfig, VmConfig};
pub use error::{
    ConfigError, IsolateError, IsolateStage, LoadError, RegistryError, SourceError, VmError,
};
pub use isolate::{Isolate, IsolateId, IsolateManager, IsolateTable};
pub use library::ScriptLibrary;
pub use registry::LibraryRegistry;
pub use runtime::{
    IsolateHandle, IsolateHooks, LibraryTag, LibraryTagHandler, Scope, ScriptRuntime, TagResult,
};
pub use source::{FsSourceProvider, LibrarySource, SourceProvider};
pub use vm::VirtualMachine;

/// Engine result
pub type VmResult<T> = Result<T, VmError>;
