//! `Platform_*` natives

use hostvm_sdk::{NativeArguments, NativeResult, Value};

/// `Platform_NumberOfProcessors() -> int`
pub fn number_of_processors(_args: &mut NativeArguments) -> NativeResult {
    Ok(Value::Int(num_cpus::get() as i64))
}

/// `Platform_OperatingSystem() -> String`
pub fn operating_system(_args: &mut NativeArguments) -> NativeResult {
    let name = if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "android") {
        "android"
    } else {
        std::env::consts::OS
    };
    Ok(Value::from(name))
}

/// `Platform_PathSeparator() -> String`
pub fn path_separator(_args: &mut NativeArguments) -> NativeResult {
    Ok(Value::String(std::path::MAIN_SEPARATOR.to_string()))
}

/// `Platform_LocalHostname() -> String`
pub fn local_hostname(_args: &mut NativeArguments) -> NativeResult {
    Ok(Value::String(
        hostname().unwrap_or_else(|| "localhost".to_string()),
    ))
}

/// `Platform_Environment() -> List<String>` of `KEY=VALUE` entries
pub fn environment(_args: &mut NativeArguments) -> NativeResult {
    let entries = std::env::vars_os()
        .map(|(key, value)| {
            Value::String(format!(
                "{}={}",
                key.to_string_lossy(),
                value.to_string_lossy()
            ))
        })
        .collect();
    Ok(Value::List(entries))
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer length is passed alongside the pointer.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).ok().map(str::to_string)
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
