//! Integration tests for the `dart:io` natives, called through the resolver

use hostvm_sdk::{
    ApiError, LibraryContext, LibraryHandle, NativeArguments, NativeError, NativeInstance,
    NativeLibrary, Value,
};
use hostvm_stdlib::io::socket::SocketHandle;
use hostvm_stdlib::{io_library, ISOLATE_LIBRARY};
use std::cell::RefCell;
use std::net::TcpListener;

fn call(name: &str, args: Vec<Value>) -> Result<(Value, Vec<Value>), NativeError> {
    let library = io_library();
    let f = library
        .resolve(name, args.len())
        .unwrap_or_else(|| panic!("{} is not registered", name));
    let mut args = NativeArguments::new(args);
    let result = f(&mut args)?;
    Ok((result, args.into_values()))
}

fn ok(name: &str, args: Vec<Value>) -> Value {
    call(name, args).unwrap().0
}

fn s(text: &str) -> Value {
    Value::from(text)
}

#[test]
fn test_file_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let path = path.to_str().unwrap();

    let handle = ok("File_Open", vec![s(path), Value::Int(1)]);
    assert_eq!(
        ok("File_WriteString", vec![handle.clone(), s("hello")]),
        Value::Int(5)
    );
    assert_eq!(ok("File_WriteByte", vec![handle.clone(), Value::Int(b'!' as i64)]), Value::Int(1));
    assert_eq!(ok("File_Length", vec![handle.clone()]), Value::Int(6));
    assert_eq!(ok("File_Position", vec![handle.clone()]), Value::Int(6));

    ok("File_SetPosition", vec![handle.clone(), Value::Int(1)]);
    let (read, values) = call(
        "File_ReadList",
        vec![handle.clone(), Value::Bytes(vec![0; 8]), Value::Int(2), Value::Int(4)],
    )
    .unwrap();
    assert_eq!(read, Value::Int(4));
    assert_eq!(values[1], Value::Bytes(b"\0\0ello\0\0".to_vec()));

    ok("File_Truncate", vec![handle.clone(), Value::Int(2)]);
    ok("File_SetPosition", vec![handle.clone(), Value::Int(0)]);
    assert_eq!(ok("File_ReadByte", vec![handle.clone()]), Value::Int(b'h' as i64));
    assert_eq!(ok("File_ReadByte", vec![handle.clone()]), Value::Int(b'e' as i64));
    assert_eq!(ok("File_ReadByte", vec![handle.clone()]), Value::Int(-1));

    assert_eq!(ok("File_Close", vec![handle.clone()]), Value::Int(0));
    assert!(matches!(
        call("File_Close", vec![handle]),
        Err(NativeError::InvalidHandle(_))
    ));
}

#[test]
fn test_file_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    let path = path.to_str().unwrap();

    assert_eq!(ok("File_Exists", vec![s(path)]), Value::Bool(false));
    ok("File_Create", vec![s(path)]);
    assert_eq!(ok("File_Exists", vec![s(path)]), Value::Bool(true));
    assert_eq!(ok("File_LengthFromName", vec![s(path)]), Value::Int(0));
    assert!(matches!(ok("File_LastModified", vec![s(path)]), Value::Int(ms) if ms > 0));

    let parent = ok("File_Directory", vec![s(path)]);
    assert_eq!(parent, s(dir.path().to_str().unwrap()));
    assert_eq!(ok("File_Directory", vec![s("plain.txt")]), s("."));

    let full = ok("File_FullPath", vec![s(path)]);
    assert!(full.as_str().unwrap().ends_with("empty.txt"));

    ok("File_Delete", vec![s(path)]);
    assert_eq!(ok("File_Exists", vec![s(path)]), Value::Bool(false));
    assert!(matches!(
        call("File_LengthFromName", vec![s(path)]),
        Err(NativeError::Os(_))
    ));
}

#[test]
fn test_file_bad_mode_and_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x");
    let path = path.to_str().unwrap();
    assert!(call("File_Open", vec![s(path), Value::Int(9)]).is_err());

    let handle = ok("File_Open", vec![s(path), Value::Int(1)]);
    let result = call(
        "File_WriteList",
        vec![handle.clone(), Value::Bytes(vec![1, 2]), Value::Int(1), Value::Int(5)],
    );
    assert!(matches!(result, Err(NativeError::Os(_))));
    ok("File_Close", vec![handle]);
}

#[test]
fn test_directory_natives() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let nested_str = nested.to_str().unwrap();

    assert_eq!(ok("Directory_Exists", vec![s(nested_str)]), Value::Bool(false));
    ok("Directory_Create", vec![s(nested_str)]);
    assert_eq!(ok("Directory_Exists", vec![s(nested_str)]), Value::Bool(true));

    let renamed = dir.path().join("a").join("c");
    let renamed_str = renamed.to_str().unwrap();
    ok("Directory_Rename", vec![s(nested_str), s(renamed_str)]);
    assert!(renamed.is_dir());
    assert!(!nested.exists());

    let outer = dir.path().join("a");
    let outer_str = outer.to_str().unwrap();
    assert!(call("Directory_Delete", vec![s(outer_str), Value::Bool(false)]).is_err());
    ok("Directory_Delete", vec![s(outer_str), Value::Bool(true)]);
    assert!(!outer.exists());

    let template = dir.path().join("tmp_");
    let a = ok("Directory_CreateTemp", vec![s(template.to_str().unwrap())]);
    let b = ok("Directory_CreateTemp", vec![s(template.to_str().unwrap())]);
    assert_ne!(a, b);
    assert!(std::path::Path::new(a.as_str().unwrap()).is_dir());

    assert!(matches!(ok("Directory_Current", vec![]), Value::String(_)));
}

#[test]
fn test_platform_natives() {
    assert!(matches!(ok("Platform_NumberOfProcessors", vec![]), Value::Int(n) if n >= 1));
    assert_eq!(
        ok("Platform_PathSeparator", vec![]),
        Value::String(std::path::MAIN_SEPARATOR.to_string())
    );
    assert!(!ok("Platform_LocalHostname", vec![]).as_str().unwrap().is_empty());

    std::env::set_var("HOSTVM_IO_TEST", "1");
    let Value::List(env) = ok("Platform_Environment", vec![]) else {
        panic!("environment is not a list");
    };
    assert!(env.contains(&s("HOSTVM_IO_TEST=1")));

    let os = ok("Platform_OperatingSystem", vec![]);
    if cfg!(target_os = "linux") {
        assert_eq!(os, s("linux"));
    }
}

#[test]
fn test_socket_round_trip() {
    let server = NativeInstance::new("_ServerSocket");
    let listener = ok(
        "ServerSocket_CreateBindListen",
        vec![Value::Instance(server.clone()), s("127.0.0.1"), Value::Int(0), Value::Int(4)],
    );
    let listener_id = listener.as_int().unwrap() as u64;
    assert_eq!(
        server.with_peer(|h: &SocketHandle| *h),
        Some(SocketHandle(listener_id))
    );

    let port = ok("Socket_GetPort", vec![listener.clone()]);
    let client = ok(
        "Socket_CreateConnect",
        vec![Value::Null, s("127.0.0.1"), port.clone()],
    );
    let accepted = ok("ServerSocket_Accept", vec![listener, Value::Null]);

    let written = ok(
        "Socket_WriteList",
        vec![client.clone(), Value::Bytes(b"ping".to_vec()), Value::Int(0), Value::Int(4)],
    );
    assert_eq!(written, Value::Int(4));

    let (read, values) = call(
        "Socket_ReadList",
        vec![accepted.clone(), Value::Bytes(vec![0; 4]), Value::Int(0), Value::Int(4)],
    )
    .unwrap();
    assert_eq!(read, Value::Int(4));
    assert_eq!(values[1], Value::Bytes(b"ping".to_vec()));

    let Value::List(peer) = ok("Socket_GetRemotePeer", vec![client.clone()]) else {
        panic!("peer is not a list");
    };
    assert_eq!(peer[0], s("127.0.0.1"));
    assert_eq!(peer[1], port);
    assert_eq!(ok("Socket_GetError", vec![client.clone()]), Value::Null);
    assert_eq!(ok("Socket_Available", vec![accepted]), Value::Int(0));
}

#[test]
fn test_connect_refused() {
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let result = call(
        "Socket_CreateConnect",
        vec![Value::Null, s("127.0.0.1"), Value::Int(port as i64)],
    );
    assert!(matches!(result, Err(NativeError::Os(_))));
}

#[cfg(unix)]
#[test]
fn test_process_start_reads_stdout() {
    let mut args = vec![
        s("sh"),
        Value::List(vec![s("-c"), s("printf started")]),
        Value::Null,
        Value::Null,
    ];
    args.extend(std::iter::repeat(Value::Null).take(6));

    let (started, out) = call("Process_Start", args).unwrap();
    assert_eq!(started, Value::Bool(true));
    assert!(matches!(out[8], Value::Int(pid) if pid > 0));

    let stdout = out[5].clone();
    let mut collected = Vec::new();
    loop {
        let (n, values) = call(
            "Socket_ReadList",
            vec![stdout.clone(), Value::Bytes(vec![0; 64]), Value::Int(0), Value::Int(64)],
        )
        .unwrap();
        let n = n.as_int().unwrap() as usize;
        if n == 0 {
            break;
        }
        if let Value::Bytes(bytes) = &values[1] {
            collected.extend_from_slice(&bytes[..n]);
        }
    }
    assert_eq!(collected, b"started");
}

#[test]
fn test_process_start_failure_reports_error() {
    let mut args = vec![
        s("/definitely/not/a/program"),
        Value::List(vec![]),
        Value::Null,
        Value::Null,
    ];
    args.extend(std::iter::repeat(Value::Null).take(6));

    let (started, out) = call("Process_Start", args).unwrap();
    assert_eq!(started, Value::Bool(false));
    assert!(matches!(&out[9], Value::String(msg) if !msg.is_empty()));
}

// ============================================================================
// Timer factory wiring
// ============================================================================

#[derive(Default)]
struct RecordingContext {
    isolate_loaded: bool,
    calls: RefCell<Vec<(u64, String, Vec<Value>)>>,
}

impl LibraryContext for RecordingContext {
    fn lookup_library(&self, url: &str) -> Result<Option<LibraryHandle>, ApiError> {
        Ok((url == ISOLATE_LIBRARY && self.isolate_loaded).then(|| LibraryHandle::new(2)))
    }

    fn invoke(
        &self,
        library: LibraryHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, ApiError> {
        self.calls
            .borrow_mut()
            .push((library.as_u64(), function.to_string(), args));
        Ok(s("timer-factory"))
    }
}

#[test]
fn test_initializer_wires_timer_factory() {
    let ctx = RecordingContext {
        isolate_loaded: true,
        ..Default::default()
    };
    io_library().initialize(&ctx, LibraryHandle::new(1)).unwrap();

    let calls = ctx.calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], (1, "_getTimerFactoryClosure".to_string(), vec![]));
    assert_eq!(
        calls[1],
        (2, "_setTimerFactoryClosure".to_string(), vec![s("timer-factory")])
    );
}

#[test]
fn test_initializer_needs_isolate_library() {
    let ctx = RecordingContext::default();
    let err = io_library()
        .initialize(&ctx, LibraryHandle::new(1))
        .unwrap_err();
    assert!(err.message.contains("dart:isolate"));
}
