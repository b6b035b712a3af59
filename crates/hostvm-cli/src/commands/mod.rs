//! Subcommand implementations

pub mod check;
pub mod hash;
pub mod info;
pub mod natives;
pub mod resolve;

use hostvm_core::VmConfig;
use hostvm_input::{input_library, GamePadSnapshot, INPUT_LIBRARY};
use hostvm_sdk::NativeLibrary;
use hostvm_stdlib::{core_library, io_library, CORE_LIBRARY, IO_LIBRARY};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file picked up when `--config` is absent
pub const DEFAULT_CONFIG: &str = "hostvm.toml";

/// Every library that carries natives, by name
pub fn native_libraries() -> Vec<(&'static str, Arc<dyn NativeLibrary>)> {
    let core: Arc<dyn NativeLibrary> = Arc::new(core_library());
    let io: Arc<dyn NativeLibrary> = Arc::new(io_library());
    let input: Arc<dyn NativeLibrary> = Arc::new(input_library(Arc::new(GamePadSnapshot::new())));
    vec![(CORE_LIBRARY, core), (IO_LIBRARY, io), (INPUT_LIBRARY, input)]
}

/// Find a native library by name
pub fn native_library(name: &str) -> anyhow::Result<Arc<dyn NativeLibrary>> {
    native_libraries()
        .into_iter()
        .find(|(n, _)| *n == name)
        .map(|(_, library)| library)
        .ok_or_else(|| {
            let known: Vec<_> = native_libraries().iter().map(|(n, _)| *n).collect();
            anyhow::anyhow!("unknown library '{}' (known: {})", name, known.join(", "))
        })
}

/// Load `--config`, or `./hostvm.toml` when it exists, or the defaults
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<(VmConfig, Option<PathBuf>)> {
    let path = path.or_else(|| {
        let default = Path::new(DEFAULT_CONFIG);
        default.exists().then(|| default.to_path_buf())
    });
    match path {
        Some(path) => {
            let config = VmConfig::from_file(&path)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            Ok((config, Some(path)))
        }
        None => Ok((VmConfig::default(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_library_lookup() {
        assert_eq!(native_libraries().len(), 3);
        assert!(native_library("dart:io").is_ok());
        let err = native_library("dart:json").err().unwrap();
        assert!(err.to_string().contains("known: dart:builtin, dart:io, embed:input"));
    }

    #[test]
    fn test_resolve_reports_argument_mismatch() {
        assert!(resolve::execute("dart:builtin", "Exit", 1).is_ok());
        let err = resolve::execute("dart:builtin", "Exit", 2).unwrap_err();
        assert!(err.to_string().contains("registered with 1 arguments"));
        assert!(resolve::execute("embed:input", "GamePad_Rumble", 1).is_err());
    }

    #[test]
    fn test_explicit_config() {
        let dir = std::env::temp_dir().join(format!("hostvm-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hostvm.toml");
        std::fs::write(&path, "entry_point = \"start\"\n").unwrap();

        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.entry_point, "start");
        assert_eq!(used, Some(path));

        assert!(load_config(Some(dir.join("missing.toml"))).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
