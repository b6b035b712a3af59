//! Builtin native libraries for HostVM
//!
//! - [`builtin`]: `dart:builtin` (`Exit`, `Logger_PrintString`)
//! - [`io`]: `dart:io` (directories, files, platform, processes, sockets)
//!
//! Both are exposed as [`TableLibrary`](hostvm_sdk::TableLibrary) values that
//! the engine attaches as native resolvers.

#![warn(missing_docs)]

pub mod builtin;
pub mod handles;
pub mod io;

pub use builtin::{core_library, core_table, CORE_LIBRARY};
pub use handles::HandleRegistry;
pub use io::{io_library, io_table, wire_timer_factory, IO_LIBRARY, ISOLATE_LIBRARY};
