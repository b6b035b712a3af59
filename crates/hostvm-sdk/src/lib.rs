//! HostVM SDK - types for writing native script libraries
//!
//! This crate holds everything a native module needs without depending on
//! the isolate engine:
//!
//! - identifier hashing ([`fnv1a_hash`], [`split_and_hash`])
//! - marshaled values and arguments ([`Value`], [`NativeArguments`])
//! - the two-level native symbol table ([`NativeTable`])
//! - the [`NativeLibrary`] capability attached to a loaded library
//!
//! # Example
//!
//! ```ignore
//! use hostvm_sdk::{NativeTable, TableLibrary, Value};
//!
//! let library = TableLibrary::new("embed:math", || {
//!     NativeTable::builder()
//!         .class("Math", |c| {
//!             c.method("Abs", 1, |args| Ok(Value::Int(args.int(0)?.abs())))
//!         })
//!         .build()
//! });
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod hash;
pub mod library;
pub mod native;
pub mod table;
pub mod value;

pub use context::{LibraryContext, LibraryHandle};
pub use error::{ApiError, HashError, NativeError, NativeResult, TableError};
pub use hash::{fnv1a_hash, split_and_hash, QualifiedCallHash, CALL_SEPARATOR};
pub use library::{Initializer, NativeLibrary, TableLibrary};
pub use native::{NativeArguments, NativeFn};
pub use table::{ClassBuilder, NativeClassEntry, NativeEntry, NativeTable, NativeTableBuilder};
pub use value::{NativeInstance, Value};
