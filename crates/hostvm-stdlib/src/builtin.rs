//! `dart:builtin` natives
//!
//! Only two natives exist, so they live on the flat level of the table.

use hostvm_sdk::{
    NativeArguments, NativeError, NativeResult, NativeTable, TableError, TableLibrary, Value,
};
use std::io::Write;
use tracing::info;

/// Name of the core library
pub const CORE_LIBRARY: &str = "dart:builtin";

/// Build the core native table
pub fn core_table() -> Result<NativeTable, TableError> {
    NativeTable::builder()
        .function("Exit", 1, exit)
        .function("Logger_PrintString", 1, print_string)
        .build()
}

/// The core library's native capability
pub fn core_library() -> TableLibrary {
    TableLibrary::new(CORE_LIBRARY, core_table)
}

/// Exit the process with the given code
fn exit(args: &mut NativeArguments) -> NativeResult {
    let value = args.int(0)?;
    let code = i32::try_from(value).map_err(|_| NativeError::IntegerRange { index: 0, value })?;
    info!(code, "script requested exit");
    std::process::exit(code);
}

/// Print a line to stdout
fn print_string(args: &mut NativeArguments) -> NativeResult {
    let message = args.string(0)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", message)?;
    stdout.flush()?;
    Ok(Value::Null)
}
