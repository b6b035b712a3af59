//! `Directory_*` natives

use hostvm_sdk::{NativeArguments, NativeError, NativeResult, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `Directory_Exists(path) -> bool`
pub fn exists(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    Ok(Value::Bool(Path::new(path).is_dir()))
}

/// `Directory_Create(path) -> bool`, creating missing parents
pub fn create(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    fs::create_dir_all(path)?;
    Ok(Value::Bool(true))
}

/// `Directory_Current() -> String`
pub fn current(_args: &mut NativeArguments) -> NativeResult {
    let cwd = std::env::current_dir()?;
    Ok(Value::String(cwd.to_string_lossy().into_owned()))
}

/// `Directory_CreateTemp(template) -> String`.
///
/// The new directory's name is the template followed by a unique suffix.
/// An empty template creates the directory under the system temp dir.
pub fn create_temp(args: &mut NativeArguments) -> NativeResult {
    let template = args.string(0)?;
    let base = if template.is_empty() {
        std::env::temp_dir().join("temp_dir")
    } else {
        PathBuf::from(template)
    };

    let pid = std::process::id();
    loop {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut candidate = base.clone().into_os_string();
        candidate.push(format!("{}_{}", pid, n));
        let candidate = PathBuf::from(candidate);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(Value::String(candidate.to_string_lossy().into_owned())),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(NativeError::from(e)),
        }
    }
}

/// `Directory_Delete(path, recursive) -> bool`
pub fn delete(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    if args.bool(1)? {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_dir(path)?;
    }
    Ok(Value::Bool(true))
}

/// `Directory_Rename(path, newPath) -> bool`
pub fn rename(args: &mut NativeArguments) -> NativeResult {
    let from = args.string(0)?;
    let to = args.string(1)?;
    if !Path::new(from).is_dir() {
        return Err(NativeError::Os(format!("'{}' is not a directory", from)));
    }
    fs::rename(from, to)?;
    Ok(Value::Bool(true))
}
