//! `dart:io` natives
//!
//! Files, directories, sockets, listeners and child processes are held in
//! [`HandleRegistry`](crate::handles::HandleRegistry) statics and passed to
//! scripts as integer handles. The event handler and service ports belong
//! to the interpreter's own event loop and are reported as unsupported.

pub mod directory;
pub mod file;
pub mod platform;
pub mod process;
pub mod socket;

use hostvm_sdk::{
    ApiError, LibraryContext, LibraryHandle, NativeArguments, NativeError, NativeResult,
    NativeTable, TableError, TableLibrary, Value,
};
use tracing::debug;

/// Name of the I/O library
pub const IO_LIBRARY: &str = "dart:io";

/// Library that receives the timer factory
pub const ISOLATE_LIBRARY: &str = "dart:isolate";

/// I/O library function returning the timer factory closure
pub const GET_TIMER_FACTORY: &str = "_getTimerFactoryClosure";

/// Isolate library function installing the timer factory closure
pub const SET_TIMER_FACTORY: &str = "_setTimerFactoryClosure";

/// Build the I/O native table
pub fn io_table() -> Result<NativeTable, TableError> {
    NativeTable::builder()
        .class("Directory", |c| {
            c.method("Exists", 1, directory::exists)
                .method("Create", 1, directory::create)
                .method("Current", 0, directory::current)
                .method("CreateTemp", 1, directory::create_temp)
                .method("Delete", 2, directory::delete)
                .method("Rename", 2, directory::rename)
                .method("NewServicePort", 0, |_| unsupported("Directory_NewServicePort"))
        })
        .class("EventHandler", |c| {
            c.method("Start", 1, |_| unsupported("EventHandler_Start"))
                .method("SendData", 4, |_| unsupported("EventHandler_SendData"))
        })
        .class("File", |c| {
            c.method("Open", 2, file::open)
                .method("Exists", 1, file::exists)
                .method("Close", 1, file::close)
                .method("ReadByte", 1, file::read_byte)
                .method("WriteByte", 2, file::write_byte)
                .method("WriteString", 2, file::write_string)
                .method("ReadList", 4, file::read_list)
                .method("WriteList", 4, file::write_list)
                .method("Position", 1, file::position)
                .method("SetPosition", 2, file::set_position)
                .method("Truncate", 2, file::truncate)
                .method("Length", 1, file::length)
                .method("LengthFromName", 1, file::length_from_name)
                .method("LastModified", 1, file::last_modified)
                .method("Flush", 1, file::flush)
                .method("Create", 1, file::create)
                .method("Delete", 1, file::delete)
                .method("Directory", 1, file::directory)
                .method("FullPath", 1, file::full_path)
                .method("OpenStdio", 1, file::open_stdio)
                .method("GetStdioHandleType", 1, file::stdio_handle_type)
                .method("NewServicePort", 0, |_| unsupported("File_NewServicePort"))
        })
        .class("Platform", |c| {
            c.method("NumberOfProcessors", 0, platform::number_of_processors)
                .method("OperatingSystem", 0, platform::operating_system)
                .method("PathSeparator", 0, platform::path_separator)
                .method("LocalHostname", 0, platform::local_hostname)
                .method("Environment", 0, platform::environment)
        })
        .class("Process", |c| {
            c.method("Start", 10, process::start)
                .method("Kill", 3, process::kill)
        })
        .class("ServerSocket", |c| {
            c.method("CreateBindListen", 4, socket::create_bind_listen)
                .method("Accept", 2, socket::accept)
        })
        .class("Socket", |c| {
            c.method("CreateConnect", 3, socket::create_connect)
                .method("Available", 1, socket::available)
                .method("ReadList", 4, socket::read_list)
                .method("WriteList", 4, socket::write_list)
                .method("GetPort", 1, socket::port)
                .method("GetRemotePeer", 1, socket::remote_peer)
                .method("GetError", 1, socket::error)
                .method("GetStdioHandle", 2, socket::stdio_handle)
                .method("NewServicePort", 0, |_| unsupported("Socket_NewServicePort"))
        })
        .build()
}

/// The I/O library's native capability, with timer-factory wiring as its
/// initializer
pub fn io_library() -> TableLibrary {
    TableLibrary::new(IO_LIBRARY, io_table).with_initializer(wire_timer_factory)
}

/// Hand the I/O library's timer factory to the isolate library.
///
/// Timers created from `dart:isolate` go through the I/O event loop, so this
/// must run before any script code that might start a timer.
pub fn wire_timer_factory(ctx: &dyn LibraryContext, io: LibraryHandle) -> Result<(), ApiError> {
    let factory = ctx.invoke(io, GET_TIMER_FACTORY, Vec::new())?;
    let isolate = ctx
        .lookup_library(ISOLATE_LIBRARY)?
        .ok_or_else(|| ApiError::new(format!("library '{}' is not loaded", ISOLATE_LIBRARY)))?;
    ctx.invoke(isolate, SET_TIMER_FACTORY, vec![factory])?;
    debug!("timer factory installed");
    Ok(())
}

fn unsupported(name: &'static str) -> NativeResult {
    Err(NativeError::Unsupported(name))
}

/// Validate an `(offset, length)` window into a buffer of `len` bytes
pub(crate) fn buffer_window(
    args: &NativeArguments,
    offset_index: usize,
    len: usize,
) -> Result<std::ops::Range<usize>, NativeError> {
    let offset = args.int(offset_index)?;
    let count = args.int(offset_index + 1)?;
    let start = usize::try_from(offset).map_err(|_| out_of_range(offset, count, len))?;
    let count_u = usize::try_from(count).map_err(|_| out_of_range(offset, count, len))?;
    let end = start
        .checked_add(count_u)
        .filter(|end| *end <= len)
        .ok_or_else(|| out_of_range(offset, count, len))?;
    Ok(start..end)
}

fn out_of_range(offset: i64, count: i64, len: usize) -> NativeError {
    NativeError::Os(format!(
        "range {}+{} is outside a buffer of {} bytes",
        offset, count, len
    ))
}

/// Convert a byte count into a script integer
pub(crate) fn count_value(n: usize) -> Value {
    Value::Int(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostvm_sdk::NativeLibrary;

    #[test]
    fn test_io_table_shape() {
        let table = io_table().unwrap();
        assert_eq!(table.len(), 7 + 2 + 22 + 5 + 2 + 2 + 9);
        let entries = table.entries();
        assert!(entries.contains(&("Process_Start".to_string(), 10)));
        assert!(entries.contains(&("File_ReadList".to_string(), 4)));
        assert!(entries.contains(&("Socket_GetStdioHandle".to_string(), 2)));
    }

    #[test]
    fn test_unsupported_natives() {
        let library = io_library();
        let f = library.resolve("EventHandler_SendData", 4).unwrap();
        assert_eq!(
            f(&mut NativeArguments::default()),
            Err(NativeError::Unsupported("EventHandler_SendData"))
        );
    }

    #[test]
    fn test_buffer_window() {
        let args = NativeArguments::new(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(buffer_window(&args, 0, 5).unwrap(), 2..5);
        assert!(buffer_window(&args, 0, 4).is_err());

        let args = NativeArguments::new(vec![Value::Int(-1), Value::Int(1)]);
        assert!(buffer_window(&args, 0, 4).is_err());
    }
}
