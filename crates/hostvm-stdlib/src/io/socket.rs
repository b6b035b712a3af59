//! `Socket_*` and `ServerSocket_*` natives
//!
//! Every byte stream a script can read or write is a socket handle: TCP
//! connections, child process pipes and the process's own stdio. When the
//! owning script object is passed in, its native peer is set to the
//! [`SocketHandle`].

use super::{buffer_window, count_value};
use crate::handles::{handle_arg, HandleRegistry};
use hostvm_sdk::{NativeArguments, NativeError, NativeResult, Value};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{ChildStderr, ChildStdin, ChildStdout};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static STREAMS: LazyLock<HandleRegistry<Stream>> = LazyLock::new(HandleRegistry::new);

/// Native peer of a script socket object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandle(pub u64);

pub(crate) enum Stream {
    Listener(Arc<TcpListener>),
    Tcp(TcpStream),
    ChildIn(ChildStdin),
    ChildOut(ChildStdout),
    ChildErr(ChildStderr),
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::ChildOut(s) => s.read(buf),
            Stream::ChildErr(s) => s.read(buf),
            Stream::Stdin => io::stdin().lock().read(buf),
            Stream::Listener(_) | Stream::ChildIn(_) | Stream::Stdout | Stream::Stderr => Err(io::Error::new(
                ErrorKind::Unsupported,
                "socket does not support reading",
            )),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::ChildIn(s) => s.write(buf),
            Stream::Stdout => io::stdout().lock().write(buf),
            Stream::Stderr => io::stderr().lock().write(buf),
            Stream::Listener(_) | Stream::ChildOut(_) | Stream::ChildErr(_) | Stream::Stdin => Err(io::Error::new(
                ErrorKind::Unsupported,
                "socket does not support writing",
            )),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, NativeError> {
        match self {
            Stream::Listener(l) => Ok(l.local_addr()?),
            other => Ok(other.tcp()?.local_addr()?),
        }
    }

    fn tcp(&self) -> Result<&TcpStream, NativeError> {
        match self {
            Stream::Tcp(s) => Ok(s),
            _ => Err(NativeError::Os("socket is not a network connection".into())),
        }
    }
}

pub(crate) fn insert_stream(stream: Stream) -> u64 {
    STREAMS.insert(stream)
}

/// Record the handle on the owning script object, if one was passed
fn attach(args: &NativeArguments, owner_index: usize, id: u64) -> NativeResult {
    if let Value::Instance(owner) = args.get(owner_index)? {
        owner.set_peer(SocketHandle(id));
    }
    Ok(Value::Int(id as i64))
}

fn port_arg(args: &NativeArguments, index: usize) -> Result<u16, NativeError> {
    let port = args.int(index)?;
    u16::try_from(port).map_err(|_| NativeError::Os(format!("invalid port {}", port)))
}

/// `ServerSocket_CreateBindListen(owner, address, port, backlog) -> handle`
pub fn create_bind_listen(args: &mut NativeArguments) -> NativeResult {
    let address = args.string(1)?;
    let port = port_arg(args, 2)?;
    let backlog = args.int(3)?;
    let listener = TcpListener::bind((address, port))?;
    debug!(address, port, backlog, "listening");
    attach(args, 0, insert_stream(Stream::Listener(Arc::new(listener))))
}

/// `ServerSocket_Accept(listener, owner) -> handle`; blocks until a peer
/// connects
pub fn accept(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let listener = STREAMS.with(id, |stream| match stream {
        Stream::Listener(l) => Ok(Arc::clone(l)),
        _ => Err(NativeError::Os("socket is not listening".into())),
    })??;
    let (stream, peer) = listener.accept()?;
    debug!(%peer, "accepted connection");
    attach(args, 1, insert_stream(Stream::Tcp(stream)))
}

/// `Socket_CreateConnect(owner, host, port) -> handle`
pub fn create_connect(args: &mut NativeArguments) -> NativeResult {
    let host = args.string(1)?;
    let port = port_arg(args, 2)?;
    let stream = TcpStream::connect((host, port))?;
    attach(args, 0, insert_stream(Stream::Tcp(stream)))
}

/// `Socket_Available(handle) -> int`, bytes readable without blocking
pub fn available(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    STREAMS.with(id, |stream| -> NativeResult {
        let Stream::Tcp(s) = stream else {
            return Ok(Value::Int(0));
        };
        s.set_nonblocking(true)?;
        let mut probe = [0u8; 4096];
        let peeked = s.peek(&mut probe);
        s.set_nonblocking(false)?;
        match peeked {
            Ok(n) => Ok(count_value(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Value::Int(0)),
            Err(e) => Err(NativeError::from(e)),
        }
    })?
}

/// `Socket_ReadList(handle, buffer, offset, length) -> int`
pub fn read_list(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let range = buffer_window(args, 2, args.bytes(1)?.len())?;
    let buffer = args.bytes_mut(1)?;
    let n = STREAMS.with_mut(id, |stream| stream.read(&mut buffer[range]))??;
    Ok(count_value(n))
}

/// `Socket_WriteList(handle, buffer, offset, length) -> int`
pub fn write_list(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let buffer = args.bytes(1)?;
    let range = buffer_window(args, 2, buffer.len())?;
    let n = STREAMS.with_mut(id, |stream| stream.write(&buffer[range]))??;
    Ok(count_value(n))
}

/// `Socket_GetPort(handle) -> int`; accepts connection and listener handles
pub fn port(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let addr = STREAMS.with(id, Stream::local_addr)??;
    Ok(Value::Int(i64::from(addr.port())))
}

/// `Socket_GetRemotePeer(handle) -> [host, port]`
pub fn remote_peer(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let addr = STREAMS.with(id, |stream| -> Result<_, NativeError> {
        Ok(stream.tcp()?.peer_addr()?)
    })??;
    Ok(Value::List(vec![
        Value::String(addr.ip().to_string()),
        Value::Int(i64::from(addr.port())),
    ]))
}

/// `Socket_GetError(handle) -> String?`, the pending socket error if any
pub fn error(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let pending = STREAMS.with(id, |stream| match stream {
        Stream::Tcp(s) => s.take_error().map_err(NativeError::from),
        _ => Ok(None),
    })??;
    Ok(pending.map_or(Value::Null, |e| Value::String(e.to_string())))
}

/// `Socket_GetStdioHandle(owner, fd) -> handle`
pub fn stdio_handle(args: &mut NativeArguments) -> NativeResult {
    let stream = match args.int(1)? {
        0 => Stream::Stdin,
        1 => Stream::Stdout,
        2 => Stream::Stderr,
        fd => return Err(NativeError::Os(format!("{} is not a stdio descriptor", fd))),
    };
    attach(args, 0, insert_stream(stream))
}
