//! `File_*` natives

use super::{buffer_window, count_value};
use crate::handles::{handle_arg, HandleRegistry};
use hostvm_sdk::{NativeArguments, NativeError, NativeResult, Value};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

static FILES: LazyLock<HandleRegistry<OpenFile>> = LazyLock::new(HandleRegistry::new);

/// `File_Open` mode: read only
pub const MODE_READ: i64 = 0;
/// `File_Open` mode: read/write, created and truncated
pub const MODE_WRITE: i64 = 1;
/// `File_Open` mode: read/append, created if missing
pub const MODE_APPEND: i64 = 2;

/// Stdio handle type: terminal
pub const STDIO_TERMINAL: i64 = 0;
/// Stdio handle type: pipe
pub const STDIO_PIPE: i64 = 1;
/// Stdio handle type: regular file
pub const STDIO_FILE: i64 = 2;
/// Stdio handle type: socket
pub const STDIO_SOCKET: i64 = 3;
/// Stdio handle type: anything else
pub const STDIO_OTHER: i64 = 4;

enum OpenFile {
    Disk(fs::File),
    Stdin,
    Stdout,
    Stderr,
}

impl OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            OpenFile::Disk(file) => file.read(buf),
            OpenFile::Stdin => io::stdin().lock().read(buf),
            OpenFile::Stdout | OpenFile::Stderr => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot read from an output stream",
            )),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OpenFile::Disk(file) => file.write_all(buf)?,
            OpenFile::Stdout => io::stdout().lock().write_all(buf)?,
            OpenFile::Stderr => io::stderr().lock().write_all(buf)?,
            OpenFile::Stdin => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "cannot write to an input stream",
                ))
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OpenFile::Disk(file) => file.flush(),
            OpenFile::Stdout => io::stdout().flush(),
            OpenFile::Stderr => io::stderr().flush(),
            OpenFile::Stdin => Ok(()),
        }
    }

    fn disk(&mut self) -> Result<&mut fs::File, NativeError> {
        match self {
            OpenFile::Disk(file) => Ok(file),
            _ => Err(NativeError::Os("operation requires a regular file".into())),
        }
    }
}

fn with_file<R>(
    args: &NativeArguments,
    f: impl FnOnce(&mut OpenFile) -> Result<R, NativeError>,
) -> Result<R, NativeError> {
    let id = handle_arg(args, 0)?;
    FILES.with_mut(id, f)?
}

/// `File_Open(path, mode) -> handle`
pub fn open(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    let mode = args.int(1)?;
    let mut options = fs::OpenOptions::new();
    match mode {
        MODE_READ => options.read(true),
        MODE_WRITE => options.read(true).write(true).create(true).truncate(true),
        MODE_APPEND => options.read(true).append(true).create(true),
        other => return Err(NativeError::Os(format!("unknown file mode {}", other))),
    };
    let file = options.open(path)?;
    Ok(Value::Int(FILES.insert(OpenFile::Disk(file)) as i64))
}

/// `File_Exists(path) -> bool`
pub fn exists(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    Ok(Value::Bool(Path::new(path).is_file()))
}

/// `File_Close(handle) -> int`
pub fn close(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    match FILES.remove(id) {
        Some(mut file) => {
            file.flush()?;
            Ok(Value::Int(0))
        }
        None => Err(NativeError::InvalidHandle(id as i64)),
    }
}

/// `File_ReadByte(handle) -> int`, `-1` at end of file
pub fn read_byte(args: &mut NativeArguments) -> NativeResult {
    with_file(args, |file| {
        let mut byte = [0u8; 1];
        let n = file.read(&mut byte)?;
        Ok(Value::Int(if n == 0 { -1 } else { i64::from(byte[0]) }))
    })
}

/// `File_WriteByte(handle, value) -> int`
pub fn write_byte(args: &mut NativeArguments) -> NativeResult {
    let byte = args.int(1)? as u8;
    with_file(args, |file| Ok(count_value(file.write(&[byte])?)))
}

/// `File_WriteString(handle, string) -> int`
pub fn write_string(args: &mut NativeArguments) -> NativeResult {
    let text = args.string(1)?.to_string();
    with_file(args, |file| Ok(count_value(file.write(text.as_bytes())?)))
}

/// `File_ReadList(handle, buffer, offset, length) -> int`
pub fn read_list(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let range = buffer_window(args, 2, args.bytes(1)?.len())?;
    let buffer = args.bytes_mut(1)?;
    let n = FILES.with_mut(id, |file| file.read(&mut buffer[range]))??;
    Ok(count_value(n))
}

/// `File_WriteList(handle, buffer, offset, length) -> int`
pub fn write_list(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let buffer = args.bytes(1)?;
    let range = buffer_window(args, 2, buffer.len())?;
    let n = FILES.with_mut(id, |file| file.write(&buffer[range]))??;
    Ok(count_value(n))
}

/// `File_Position(handle) -> int`
pub fn position(args: &mut NativeArguments) -> NativeResult {
    with_file(args, |file| {
        Ok(Value::Int(file.disk()?.stream_position()? as i64))
    })
}

/// `File_SetPosition(handle, position) -> bool`
pub fn set_position(args: &mut NativeArguments) -> NativeResult {
    let position = non_negative(args.int(1)?)?;
    with_file(args, |file| {
        file.disk()?.seek(SeekFrom::Start(position))?;
        Ok(Value::Bool(true))
    })
}

/// `File_Truncate(handle, length) -> bool`
pub fn truncate(args: &mut NativeArguments) -> NativeResult {
    let length = non_negative(args.int(1)?)?;
    with_file(args, |file| {
        file.disk()?.set_len(length)?;
        Ok(Value::Bool(true))
    })
}

/// `File_Length(handle) -> int`
pub fn length(args: &mut NativeArguments) -> NativeResult {
    with_file(args, |file| {
        Ok(Value::Int(file.disk()?.metadata()?.len() as i64))
    })
}

/// `File_LengthFromName(path) -> int`
pub fn length_from_name(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    Ok(Value::Int(fs::metadata(path)?.len() as i64))
}

/// `File_LastModified(path) -> int`, milliseconds since the Unix epoch
pub fn last_modified(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    let modified = fs::metadata(path)?.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(Value::Int(millis))
}

/// `File_Flush(handle) -> bool`
pub fn flush(args: &mut NativeArguments) -> NativeResult {
    with_file(args, |file| {
        file.flush()?;
        Ok(Value::Bool(true))
    })
}

/// `File_Create(path) -> bool`; an existing file is left untouched
pub fn create(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    fs::OpenOptions::new().write(true).create(true).open(path)?;
    Ok(Value::Bool(true))
}

/// `File_Delete(path) -> bool`
pub fn delete(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    fs::remove_file(path)?;
    Ok(Value::Bool(true))
}

/// `File_Directory(path) -> String`
pub fn directory(args: &mut NativeArguments) -> NativeResult {
    let path = Path::new(args.string(0)?);
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    Ok(Value::String(parent))
}

/// `File_FullPath(path) -> String`
pub fn full_path(args: &mut NativeArguments) -> NativeResult {
    let path = args.string(0)?;
    Ok(Value::String(
        fs::canonicalize(path)?.to_string_lossy().into_owned(),
    ))
}

/// `File_OpenStdio(fd) -> handle`
pub fn open_stdio(args: &mut NativeArguments) -> NativeResult {
    let stream = match args.int(0)? {
        0 => OpenFile::Stdin,
        1 => OpenFile::Stdout,
        2 => OpenFile::Stderr,
        fd => return Err(NativeError::Os(format!("{} is not a stdio descriptor", fd))),
    };
    Ok(Value::Int(FILES.insert(stream) as i64))
}

/// `File_GetStdioHandleType(fd) -> int`
pub fn stdio_handle_type(args: &mut NativeArguments) -> NativeResult {
    let fd = args.int(0)?;
    if !(0..=2).contains(&fd) {
        return Err(NativeError::Os(format!("{} is not a stdio descriptor", fd)));
    }
    Ok(Value::Int(classify_descriptor(fd as i32)))
}

#[cfg(unix)]
fn classify_descriptor(fd: i32) -> i64 {
    // SAFETY: fd is 0..=2 and `stat` is a plain out-parameter.
    unsafe {
        if libc::isatty(fd) == 1 {
            return STDIO_TERMINAL;
        }
        let mut stat: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut stat) != 0 {
            return STDIO_OTHER;
        }
        match stat.st_mode & libc::S_IFMT {
            libc::S_IFIFO => STDIO_PIPE,
            libc::S_IFREG => STDIO_FILE,
            libc::S_IFSOCK => STDIO_SOCKET,
            _ => STDIO_OTHER,
        }
    }
}

#[cfg(not(unix))]
fn classify_descriptor(fd: i32) -> i64 {
    use std::io::IsTerminal;
    let terminal = match fd {
        0 => io::stdin().is_terminal(),
        1 => io::stdout().is_terminal(),
        _ => io::stderr().is_terminal(),
    };
    if terminal {
        STDIO_TERMINAL
    } else {
        STDIO_OTHER
    }
}

fn non_negative(n: i64) -> Result<u64, NativeError> {
    u64::try_from(n).map_err(|_| NativeError::Os(format!("negative offset {}", n)))
}
