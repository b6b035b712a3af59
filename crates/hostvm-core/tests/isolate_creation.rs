//! Integration tests for isolate creation
//!
//! Drives the full pipeline (builtins, tag handler, script load, native
//! resolution) through the in-memory runtime.

use hostvm_core::testing::{MemorySources, MockRuntime, RuntimeEvent, TIMER_FACTORY};
use hostvm_core::{
    IsolateError, IsolateStage, LibrarySource, LibraryTag, ScriptRuntime, TagResult,
    VirtualMachine, VmConfig, VmError,
};
use hostvm_input::{input_library, GamePadSnapshot, RawGamePad, INPUT_LIBRARY, INPUT_SOURCE};
use hostvm_sdk::{ApiError, NativeLibrary, NativeTable, TableLibrary, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Helper to build an initialized VM over in-memory sources rooted at /app
fn setup(sources: MemorySources) -> (Arc<MockRuntime>, VirtualMachine) {
    let runtime = Arc::new(MockRuntime::new());
    let config = VmConfig {
        working_dir: Some("/app".into()),
        ..VmConfig::default()
    };
    let vm = VirtualMachine::with_sources(runtime.clone(), config, Arc::new(sources));
    vm.initialize().unwrap();
    (runtime, vm)
}

fn isolate_error(err: VmError) -> IsolateError {
    match err {
        VmError::Isolate(e) => e,
        other => panic!("expected an isolate error, got {:?}", other),
    }
}

fn counting_library(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn NativeLibrary> {
    Arc::new(
        TableLibrary::new(name, || {
            NativeTable::builder()
                .class("Util", |c| c.method("Ping", 0, |_| Ok(Value::from("pong"))))
                .build()
        })
        .with_initializer(move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
}

#[test]
fn test_input_native_resolved_once_per_call() {
    let sources = MemorySources::new().with(
        "/app/main.dart",
        "import embed:input\n\
         def main\n\
         \x20 new $state embed:input GamePadState_New\n\
         \x20 call embed:input GamePad_GetState 1 $state\n\
         \x20 $trigger = call embed:input GamePadState_GetLeftTrigger $state\n\
         end\n",
    );
    let (runtime, vm) = setup(sources);

    let snapshot = Arc::new(GamePadSnapshot::new());
    snapshot.poll([
        None,
        Some(RawGamePad {
            packet_number: 1,
            left_trigger: 255,
            ..Default::default()
        }),
        None,
        None,
    ]);
    let natives: Arc<dyn NativeLibrary> = Arc::new(input_library(snapshot.clone()));
    vm.load_script_library(
        INPUT_LIBRARY,
        LibrarySource::Inline(INPUT_SOURCE.to_string()),
        Some(natives),
    )
    .unwrap();

    let isolate = vm.load_script("main.dart").unwrap();
    assert_eq!(isolate.script_uri(), "file:///app/main.dart");
    assert_eq!(vm.number_of_isolates(), 1);
    assert!(runtime.has_resolver(isolate.handle(), INPUT_LIBRARY));
    assert_eq!(runtime.current_isolate(), None);

    let get_state = |e: &RuntimeEvent| {
        matches!(e, RuntimeEvent::ResolveNative { identifier, .. } if identifier == "GamePad_GetState")
    };

    assert_eq!(isolate.invoke_function("main").unwrap(), Value::Double(1.0));
    assert_eq!(runtime.count_events(get_state), 1);

    isolate.invoke_function("main").unwrap();
    assert_eq!(runtime.count_events(get_state), 2);
    assert_eq!(runtime.scope_depth(isolate.handle()), 0);
}

#[test]
fn test_unknown_import_fails_with_url() {
    let sources = MemorySources::new().with(
        "/app/main.dart",
        "import embed:missing\ndef main\nend\n",
    );
    let (runtime, vm) = setup(sources);

    let err = isolate_error(vm.load_script("main.dart").unwrap_err());
    assert_eq!(err.failed_stage(), Some(IsolateStage::LoadScript));
    assert!(
        err.to_string().contains("Do not know how to load 'embed:missing'"),
        "unexpected error: {}",
        err
    );

    assert_eq!(vm.number_of_isolates(), 0);
    assert_eq!(runtime.live_isolates(), 0);
    assert_eq!(runtime.current_isolate(), None);
}

#[test]
fn test_io_fault_stops_before_script() {
    let sources = MemorySources::new().with("/app/main.dart", "def main\nend\n");
    let (runtime, vm) = setup(sources);
    runtime.inject_fault("dart:io", "io library is corrupt");

    let err = isolate_error(vm.load_script("main.dart").unwrap_err());
    assert_eq!(err.failed_stage(), Some(IsolateStage::LoadIoLibrary));
    assert!(err.to_string().contains("io library is corrupt"));
    assert_eq!(
        runtime.count_events(|e| matches!(e, RuntimeEvent::LoadScript(_))),
        0
    );
    assert_eq!(runtime.live_isolates(), 0);
}

#[test]
fn test_missing_script_file() {
    let (runtime, vm) = setup(MemorySources::new());

    let err = isolate_error(vm.load_script("nope.dart").unwrap_err());
    assert_eq!(err.failed_stage(), Some(IsolateStage::LoadScript));
    assert!(err.to_string().contains("Unable to read file"));
    assert_eq!(runtime.live_isolates(), 0);
}

#[test]
fn test_create_failure_reported() {
    let (runtime, vm) = setup(MemorySources::new());
    runtime.inject_fault("broken.dart", "snapshot mismatch");

    let err = isolate_error(vm.load_script("broken.dart").unwrap_err());
    assert_eq!(
        err,
        IsolateError::Stage {
            stage: IsolateStage::CreateIsolate,
            message: "snapshot mismatch".into()
        }
    );
}

#[test]
fn test_builtins_wired() {
    let sources = MemorySources::new().with(
        "/app/main.dart",
        "def main\n  $exists = call dart:io File_Exists \"/definitely/not/here\"\nend\n",
    );
    let (runtime, vm) = setup(sources);

    let isolate = vm.load_script("main.dart").unwrap();
    assert_eq!(
        runtime.timer_factory(isolate.handle()),
        Some(Value::from(TIMER_FACTORY))
    );
    assert!(runtime.has_resolver(isolate.handle(), "dart:builtin"));
    assert!(runtime.has_resolver(isolate.handle(), "dart:io"));
    assert!(!runtime.has_resolver(isolate.handle(), "dart:uri"));
    assert_eq!(isolate.invoke_function("main").unwrap(), Value::Bool(false));

    assert!(runtime.events().contains(&RuntimeEvent::ImportLibrary {
        library: "file:///app/main.dart".into(),
        import: "dart:builtin".into(),
    }));
}

#[test]
fn test_library_loads_once_per_isolate() {
    let sources = MemorySources::new()
        .with(
            "/app/main.dart",
            "import embed:a\nimport embed:b\ndef main\n  $r = call embed:util Util_Ping\nend\n",
        )
        .with("/app/other.dart", "import embed:util\ndef main\nend\n");
    let (runtime, vm) = setup(sources);

    let calls = Arc::new(AtomicUsize::new(0));
    vm.load_script_library(
        "embed:util",
        LibrarySource::Inline("def helper\nend\n".into()),
        Some(counting_library("embed:util", calls.clone())),
    )
    .unwrap();
    for name in ["embed:a", "embed:b"] {
        vm.load_script_library(name, LibrarySource::Inline("import embed:util\n".into()), None)
            .unwrap();
    }

    let main = vm.load_script("main.dart").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        runtime.count_events(|e| *e == RuntimeEvent::LoadLibrary("embed:util".into())),
        1
    );
    assert_eq!(main.invoke_function("main").unwrap(), Value::from("pong"));

    vm.load_script("other.dart").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cyclic_import_initializes_once() {
    let sources = MemorySources::new().with("/app/main.dart", "import embed:a\ndef main\nend\n");
    let (runtime, vm) = setup(sources);

    let calls = Arc::new(AtomicUsize::new(0));
    vm.load_script_library(
        "embed:a",
        LibrarySource::Inline("import embed:b\n".into()),
        Some(counting_library("embed:a", calls.clone())),
    )
    .unwrap();
    vm.load_script_library("embed:b", LibrarySource::Inline("import embed:a\n".into()), None)
        .unwrap();

    let isolate = vm.load_script("main.dart").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        runtime.count_events(|e| matches!(
            e,
            RuntimeEvent::SetNativeResolver { library, attached: true } if library == "embed:a"
        )),
        1
    );
    assert!(runtime
        .library_urls(isolate.handle())
        .contains(&"embed:b".to_string()));
}

#[test]
fn test_failed_initializer_detaches_resolver() {
    let sources = MemorySources::new().with("/app/main.dart", "import embed:util\n");
    let (runtime, vm) = setup(sources);

    let natives: Arc<dyn NativeLibrary> = Arc::new(
        TableLibrary::new("embed:util", || Ok(NativeTable::default()))
            .with_initializer(|_, _| Err(ApiError::new("init failed"))),
    );
    vm.load_script_library("embed:util", LibrarySource::Inline(String::new()), Some(natives))
        .unwrap();

    let err = isolate_error(vm.load_script("main.dart").unwrap_err());
    assert!(err.to_string().contains("initializer failed: init failed"));

    let resolver_events: Vec<_> = runtime
        .events()
        .into_iter()
        .filter(|e| {
            matches!(e, RuntimeEvent::SetNativeResolver { library, .. } if library == "embed:util")
        })
        .collect();
    assert_eq!(
        resolver_events,
        vec![
            RuntimeEvent::SetNativeResolver {
                library: "embed:util".into(),
                attached: true
            },
            RuntimeEvent::SetNativeResolver {
                library: "embed:util".into(),
                attached: false
            },
        ]
    );
}

#[test]
fn test_library_source_unreadable() {
    let sources = MemorySources::new().with("/app/main.dart", "import embed:ghost\n");
    let (_runtime, vm) = setup(sources);
    vm.load_script_library("embed:ghost", LibrarySource::File("/app/absent.dart".into()), None)
        .unwrap();

    let err = isolate_error(vm.load_script("main.dart").unwrap_err());
    assert!(err.to_string().contains("Unable to read file '/app/absent.dart'"));
}

#[test]
fn test_spawned_isolate_has_parent() {
    let sources = MemorySources::new()
        .with("/app/main.dart", "def main\n  spawn worker.dart\nend\n")
        .with("/app/worker.dart", "def main\nend\n");
    let (runtime, vm) = setup(sources);

    let main = vm.load_script("main.dart").unwrap();
    main.invoke_function("main").unwrap();
    assert_eq!(vm.number_of_isolates(), 2);

    let children = vm.manager().isolates().children(main.id());
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].parent(), Some(main.id()));
    assert_eq!(children[0].script_uri(), "file:///app/worker.dart");
    assert_eq!(runtime.current_isolate(), None);
}

#[test]
fn test_shutdown_removes_isolate() {
    let sources = MemorySources::new().with("/app/main.dart", "def main\nend\n");
    let (runtime, vm) = setup(sources);

    let isolate = vm.load_script("main.dart").unwrap();
    let id = isolate.id();
    assert!(vm.isolate(id).is_some());

    isolate.shutdown().unwrap();
    assert_eq!(vm.number_of_isolates(), 0);
    assert!(vm.isolate(id).is_none());
    assert_eq!(runtime.live_isolates(), 0);
}

#[test]
fn test_script_error_propagates() {
    let sources = MemorySources::new().with("/app/main.dart", "def main\n  throw boom\nend\n");
    let (_runtime, vm) = setup(sources);

    let isolate = vm.load_script("main.dart").unwrap();
    match isolate.invoke_function("main") {
        Err(IsolateError::Invoke { function, source }) => {
            assert_eq!(function, "main");
            assert_eq!(source.message, "boom");
        }
        other => panic!("expected an invoke error, got {:?}", other),
    }
    assert!(isolate.invoke_function("missing").is_err());
}

#[test]
fn test_tag_handler_canonicalize() {
    let (_runtime, vm) = setup(MemorySources::new());
    vm.load_script_library("embed:util", LibrarySource::Inline(String::new()), None)
        .unwrap();
    let manager = vm.manager();

    assert_eq!(
        manager
            .handle_library_tag(LibraryTag::CanonicalizeUrl, None, "dart:anything")
            .unwrap(),
        TagResult::Url("dart:anything".into())
    );
    assert_eq!(
        manager
            .handle_library_tag(LibraryTag::CanonicalizeUrl, None, "embed:util")
            .unwrap(),
        TagResult::Url("embed:util".into())
    );
    assert_eq!(
        manager
            .handle_library_tag(LibraryTag::Import, None, "embed:nope")
            .unwrap_err()
            .message,
        "Do not know how to load 'embed:nope'"
    );
}
