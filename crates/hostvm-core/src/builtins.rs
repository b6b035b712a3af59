//! The builtin `dart:` library set
//!
//! `dart:builtin` and `dart:io` carry native resolvers; the rest come from
//! the snapshot and only need to be looked up.

use crate::library::ScriptLibrary;
use hostvm_sdk::NativeLibrary;
use hostvm_stdlib::{core_library, io_library, CORE_LIBRARY, IO_LIBRARY};
use std::sync::Arc;

pub use hostvm_stdlib::ISOLATE_LIBRARY;

/// Core library URL
pub const BUILTIN_LIBRARY: &str = CORE_LIBRARY;
/// I/O library URL
pub const DART_IO_LIBRARY: &str = IO_LIBRARY;
/// JSON library URL
pub const JSON_LIBRARY: &str = "dart:json";
/// URI library URL
pub const URI_LIBRARY: &str = "dart:uri";
/// Crypto library URL
pub const CRYPTO_LIBRARY: &str = "dart:crypto";
/// UTF library URL
pub const UTF_LIBRARY: &str = "dart:utf";

/// Core library function resolving a script URI against a directory
pub const RESOLVE_SCRIPT_URI: &str = "_resolveScriptUri";
/// Core library function turning a `file:` URI into a path
pub const FILE_PATH_FROM_URI: &str = "_filePathFromUri";

/// Fresh descriptors for every builtin library
pub fn builtin_libraries() -> Vec<Arc<ScriptLibrary>> {
    let core: Arc<dyn NativeLibrary> = Arc::new(core_library());
    let io: Arc<dyn NativeLibrary> = Arc::new(io_library());
    vec![
        Arc::new(ScriptLibrary::new(BUILTIN_LIBRARY, None, Some(core))),
        Arc::new(ScriptLibrary::new(DART_IO_LIBRARY, None, Some(io))),
        Arc::new(ScriptLibrary::new(JSON_LIBRARY, None, None)),
        Arc::new(ScriptLibrary::new(URI_LIBRARY, None, None)),
        Arc::new(ScriptLibrary::new(CRYPTO_LIBRARY, None, None)),
        Arc::new(ScriptLibrary::new(UTF_LIBRARY, None, None)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_set() {
        let builtins = builtin_libraries();
        let names: Vec<_> = builtins.iter().map(|l| l.name()).collect();
        assert_eq!(
            names,
            ["dart:builtin", "dart:io", "dart:json", "dart:uri", "dart:crypto", "dart:utf"]
        );
        assert!(builtins.iter().all(|l| l.source().is_none()));
        assert!(builtins[0].native().is_some());
        assert!(builtins[1].native().is_some());
        assert!(builtins[2..].iter().all(|l| l.native().is_none()));
    }

    #[test]
    fn test_builtin_natives_resolve() {
        let builtins = builtin_libraries();
        let core = builtins[0].native().unwrap();
        assert!(core.resolve("Logger_PrintString", 1).is_some());
        let io = builtins[1].native().unwrap();
        assert!(io.resolve("File_Exists", 1).is_some());
        assert!(io.resolve("Exit", 1).is_none());
    }
}
