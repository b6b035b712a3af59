//! Deterministic in-memory runtime
//!
//! [`MockRuntime`] implements [`ScriptRuntime`] without an interpreter. It
//! keeps a library table per isolate, answers the core library's URI
//! helpers itself and runs scripts written in a small line format:
//!
//! ```text
//! #import('dart:io');
//! import embed:input
//! def main
//!   new $pad embed:input GamePadState_New
//!   call embed:input GamePad_GetState 0 $pad
//!   $left = call embed:input GamePadState_GetLeftTrigger $pad
//!   spawn worker.dart
//!   throw something went wrong
//! end
//! ```
//!
//! Lines outside `def` blocks that are not imports are ignored, so real
//! library sources load as empty libraries. Arguments are integers,
//! doubles, `true`, `false`, `null`, `"text"` (no spaces), `bytes:N` (a
//! zeroed buffer) or `$variables`. Variables passed to a native are updated
//! with the values the native left behind.
//!
//! Every call into the runtime is appended to an event log, and failures
//! can be injected per library URL. There is one current isolate for the
//! whole runtime rather than one per thread.

use crate::builtins::{
    BUILTIN_LIBRARY, DART_IO_LIBRARY, FILE_PATH_FROM_URI, ISOLATE_LIBRARY, RESOLVE_SCRIPT_URI,
};
use crate::error::SourceError;
use crate::runtime::{
    IsolateHandle, IsolateHooks, LibraryTag, LibraryTagHandler, ScriptRuntime, TagResult,
};
use crate::source::SourceProvider;
use hostvm_sdk::{
    ApiError, LibraryContext, LibraryHandle, NativeArguments, NativeInstance, NativeLibrary, Value,
    CALL_SEPARATOR,
};
use hostvm_stdlib::io::{GET_TIMER_FACTORY, SET_TIMER_FACTORY};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Libraries every mock isolate starts with
pub const DEFAULT_SNAPSHOT: &[&str] = &[
    "dart:core",
    "dart:builtin",
    "dart:io",
    "dart:isolate",
    "dart:uri",
    "dart:json",
    "dart:crypto",
    "dart:utf",
    "dart:nativewrappers",
];

/// Value `_getTimerFactoryClosure` returns
pub const TIMER_FACTORY: &str = "<timer factory closure>";

// ============================================================================
// Event log
// ============================================================================

/// One call into the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// `set_flags`
    SetFlags(Vec<String>),
    /// `initialize`
    Initialize,
    /// `create_isolate`
    CreateIsolate(String),
    /// `enter_isolate`
    EnterIsolate(IsolateHandle),
    /// `exit_isolate`
    ExitIsolate,
    /// `shutdown_isolate`
    ShutdownIsolate(IsolateHandle),
    /// `enter_scope`
    EnterScope,
    /// `exit_scope`
    ExitScope,
    /// `set_library_tag_handler`
    SetTagHandler,
    /// `lookup_library`
    LookupLibrary(String),
    /// `load_library`
    LoadLibrary(String),
    /// `load_script`
    LoadScript(String),
    /// `import_library`
    ImportLibrary {
        /// Importing library
        library: String,
        /// Imported library
        import: String,
    },
    /// `set_native_resolver`
    SetNativeResolver {
        /// Library URL
        library: String,
        /// Whether a resolver was attached or detached
        attached: bool,
    },
    /// `invoke`
    Invoke {
        /// Library URL
        library: String,
        /// Function name
        function: String,
    },
    /// A script statement asked a library's resolver for a native
    ResolveNative {
        /// Library URL
        library: String,
        /// Native identifier
        identifier: String,
    },
    /// `run_loop`
    RunLoop,
}

// ============================================================================
// Script format
// ============================================================================

#[derive(Debug, Clone)]
enum Arg {
    Literal(Value),
    Var(String),
}

#[derive(Debug, Clone)]
enum Statement {
    Call {
        target: Option<String>,
        library: String,
        identifier: String,
        args: Vec<Arg>,
    },
    New {
        target: String,
        library: String,
        constructor: String,
    },
    Spawn(String),
    Throw(String),
}

#[derive(Debug, Default)]
struct ParsedScript {
    imports: Vec<(LibraryTag, String)>,
    functions: HashMap<String, Arc<Vec<Statement>>>,
}

fn parse_script(url: &str, source: &str) -> Result<ParsedScript, ApiError> {
    let mut script = ParsedScript::default();
    let mut current: Option<(String, Vec<Statement>)> = None;

    for (number, raw) in source.lines().enumerate() {
        let line = raw.trim();
        let error = |message: String| ApiError::new(format!("{}:{}: {}", url, number + 1, message));
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if let Some((name, body)) = current.as_mut() {
            if line == "end" {
                let body = std::mem::take(body);
                script.functions.insert(name.clone(), Arc::new(body));
                current = None;
            } else {
                body.push(parse_statement(line).map_err(error)?);
            }
            continue;
        }

        if let Some(name) = line.strip_prefix("def ") {
            current = Some((name.trim().to_string(), Vec::new()));
        } else if let Some(import) = line.strip_prefix("import ") {
            script.imports.push((LibraryTag::Import, import.trim().to_string()));
        } else if let Some(rest) = line.strip_prefix("#import(") {
            script.imports.push((LibraryTag::Import, quoted(rest).map_err(error)?));
        } else if let Some(rest) = line.strip_prefix("#source(") {
            script.imports.push((LibraryTag::Source, quoted(rest).map_err(error)?));
        }
    }

    match current {
        Some((name, _)) => Err(ApiError::new(format!(
            "{}: function '{}' is missing 'end'",
            url, name
        ))),
        None => Ok(script),
    }
}

fn quoted(text: &str) -> Result<String, String> {
    let start = text
        .find(['\'', '"'])
        .ok_or_else(|| format!("expected a quoted URL in '{}'", text))?;
    let quote = text[start..].chars().next().unwrap_or('\'');
    let rest = &text[start + 1..];
    let end = rest
        .find(quote)
        .ok_or_else(|| format!("unterminated URL in '{}'", text))?;
    Ok(rest[..end].to_string())
}

fn parse_statement(line: &str) -> Result<Statement, String> {
    if let Some(message) = line.strip_prefix("throw ") {
        return Ok(Statement::Throw(message.trim().to_string()));
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [target, "=", "call", library, identifier, args @ ..] => Ok(Statement::Call {
            target: Some(variable(target)?),
            library: library.to_string(),
            identifier: identifier.to_string(),
            args: args.iter().map(|a| parse_arg(a)).collect::<Result<_, _>>()?,
        }),
        ["call", library, identifier, args @ ..] => Ok(Statement::Call {
            target: None,
            library: library.to_string(),
            identifier: identifier.to_string(),
            args: args.iter().map(|a| parse_arg(a)).collect::<Result<_, _>>()?,
        }),
        ["new", target, library, constructor] => Ok(Statement::New {
            target: variable(target)?,
            library: library.to_string(),
            constructor: constructor.to_string(),
        }),
        ["spawn", uri] => Ok(Statement::Spawn(uri.to_string())),
        _ => Err(format!("unexpected statement '{}'", line)),
    }
}

fn variable(token: &str) -> Result<String, String> {
    match token.strip_prefix('$') {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(format!("expected a $variable, got '{}'", token)),
    }
}

fn parse_arg(token: &str) -> Result<Arg, String> {
    if token.starts_with('$') {
        return variable(token).map(Arg::Var);
    }
    let value = match token {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Some(size) = token.strip_prefix("bytes:") {
                let size: usize = size
                    .parse()
                    .map_err(|_| format!("invalid buffer size '{}'", size))?;
                Value::Bytes(vec![0; size])
            } else if let Some(text) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                Value::String(text.to_string())
            } else if let Ok(int) = token.parse::<i64>() {
                Value::Int(int)
            } else if let Ok(double) = token.parse::<f64>() {
                Value::Double(double)
            } else {
                return Err(format!("invalid argument '{}'", token));
            }
        }
    };
    Ok(Arg::Literal(value))
}

// ============================================================================
// Runtime state
// ============================================================================

struct MockLibrary {
    url: String,
    snapshot: bool,
    functions: HashMap<String, Arc<Vec<Statement>>>,
    imports: Vec<LibraryHandle>,
    resolver: Option<Arc<dyn NativeLibrary>>,
}

#[derive(Default)]
struct MockIsolate {
    libraries: HashMap<LibraryHandle, MockLibrary>,
    by_url: HashMap<String, LibraryHandle>,
    root: Option<LibraryHandle>,
    tag_handler: Option<LibraryTagHandler>,
    scope_depth: usize,
    timer_factory: Option<Value>,
}

impl MockIsolate {
    fn library(&self, handle: LibraryHandle) -> Result<&MockLibrary, ApiError> {
        self.libraries
            .get(&handle)
            .ok_or_else(|| ApiError::new(format!("{:?} is not a library of the current isolate", handle)))
    }

    fn library_mut(&mut self, handle: LibraryHandle) -> Result<&mut MockLibrary, ApiError> {
        self.libraries
            .get_mut(&handle)
            .ok_or_else(|| ApiError::new(format!("{:?} is not a library of the current isolate", handle)))
    }
}

#[derive(Default)]
struct MockState {
    initialize_count: usize,
    flags: Vec<String>,
    hooks: Option<Arc<dyn IsolateHooks>>,
    isolates: HashMap<IsolateHandle, MockIsolate>,
    current: Option<IsolateHandle>,
    next_isolate: u64,
    next_library: u64,
    load_faults: HashMap<String, String>,
    invoke_faults: HashMap<(String, String), String>,
}

impl MockState {
    fn current(&self) -> Result<&MockIsolate, ApiError> {
        self.current
            .and_then(|h| self.isolates.get(&h))
            .ok_or_else(no_isolate)
    }

    fn current_mut(&mut self) -> Result<&mut MockIsolate, ApiError> {
        let handle = self.current.ok_or_else(no_isolate)?;
        self.isolates.get_mut(&handle).ok_or_else(no_isolate)
    }

    fn fault(&self, url: &str) -> Result<(), ApiError> {
        match self.load_faults.get(url) {
            Some(message) => Err(ApiError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn next_library(&mut self) -> LibraryHandle {
        self.next_library += 1;
        LibraryHandle::new(self.next_library)
    }
}

fn resolve_script_uri(cwd: &str, uri: &str) -> String {
    if uri.contains("://") {
        uri.to_string()
    } else if Path::new(uri).is_absolute() {
        format!("file://{}", uri)
    } else {
        format!("file://{}/{}", cwd.trim_end_matches('/'), uri)
    }
}

fn no_isolate() -> ApiError {
    ApiError::new("no current isolate")
}

// ============================================================================
// MockRuntime
// ============================================================================

/// In-memory [`ScriptRuntime`]
pub struct MockRuntime {
    snapshot: Vec<String>,
    state: Mutex<MockState>,
    events: Mutex<Vec<RuntimeEvent>>,
}

impl MockRuntime {
    /// Runtime whose snapshot holds [`DEFAULT_SNAPSHOT`]
    pub fn new() -> Self {
        Self::with_snapshot(DEFAULT_SNAPSHOT.iter().copied())
    }

    /// Runtime whose snapshot holds the given libraries
    pub fn with_snapshot<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            snapshot: libraries.into_iter().map(Into::into).collect(),
            state: Mutex::new(MockState::default()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Make every lookup, load and isolate creation of `url` fail
    pub fn inject_fault(&self, url: impl Into<String>, message: impl Into<String>) {
        self.state.lock().load_faults.insert(url.into(), message.into());
    }

    /// Make invoking `function` of `url` fail
    pub fn inject_invoke_fault(
        &self,
        url: impl Into<String>,
        function: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.state
            .lock()
            .invoke_faults
            .insert((url.into(), function.into()), message.into());
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.load_faults.clear();
        state.invoke_faults.clear();
    }

    /// Every call so far, oldest first
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().clone()
    }

    /// Number of logged events matching `predicate`
    pub fn count_events(&self, predicate: impl Fn(&RuntimeEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Empty the event log
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Number of isolates not yet shut down
    pub fn live_isolates(&self) -> usize {
        self.state.lock().isolates.len()
    }

    /// How many times `initialize` was called
    pub fn initialize_count(&self) -> usize {
        self.state.lock().initialize_count
    }

    /// Flags passed to the last `set_flags`
    pub fn flags(&self) -> Vec<String> {
        self.state.lock().flags.clone()
    }

    /// URLs of the libraries loaded in an isolate, sorted
    pub fn library_urls(&self, isolate: IsolateHandle) -> Vec<String> {
        let state = self.state.lock();
        let mut urls: Vec<_> = state
            .isolates
            .get(&isolate)
            .map(|i| i.by_url.keys().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        urls
    }

    /// Whether `url` in `isolate` has a native resolver attached
    pub fn has_resolver(&self, isolate: IsolateHandle, url: &str) -> bool {
        let state = self.state.lock();
        state
            .isolates
            .get(&isolate)
            .and_then(|i| i.by_url.get(url).and_then(|h| i.libraries.get(h)))
            .is_some_and(|l| l.resolver.is_some())
    }

    /// Timer factory installed in an isolate's `dart:isolate`
    pub fn timer_factory(&self, isolate: IsolateHandle) -> Option<Value> {
        self.state
            .lock()
            .isolates
            .get(&isolate)
            .and_then(|i| i.timer_factory.clone())
    }

    /// Open handle scopes of an isolate
    pub fn scope_depth(&self, isolate: IsolateHandle) -> usize {
        self.state
            .lock()
            .isolates
            .get(&isolate)
            .map_or(0, |i| i.scope_depth)
    }

    fn record(&self, event: RuntimeEvent) {
        self.events.lock().push(event);
    }

    fn compile(&self, url: &str, source: &str, root: bool) -> Result<LibraryHandle, ApiError> {
        let parsed = parse_script(url, source)?;
        let (handle, handler) = {
            let mut state = self.state.lock();
            state.fault(url)?;
            let handle = state.next_library();
            let isolate = state.current_mut()?;
            if isolate.by_url.contains_key(url) {
                return Err(ApiError::new(format!("library '{}' is already loaded", url)));
            }
            if root && isolate.root.is_some() {
                return Err(ApiError::new("a script is already loaded in this isolate"));
            }
            isolate.libraries.insert(
                handle,
                MockLibrary {
                    url: url.to_string(),
                    snapshot: false,
                    functions: parsed.functions,
                    imports: Vec::new(),
                    resolver: None,
                },
            );
            isolate.by_url.insert(url.to_string(), handle);
            if root {
                isolate.root = Some(handle);
            }
            (handle, isolate.tag_handler.clone())
        };

        if let Err(e) = self.resolve_imports(handle, handler, &parsed.imports) {
            let mut state = self.state.lock();
            if let Ok(isolate) = state.current_mut() {
                isolate.libraries.remove(&handle);
                isolate.by_url.remove(url);
                if isolate.root == Some(handle) {
                    isolate.root = None;
                }
            }
            return Err(e);
        }
        Ok(handle)
    }

    fn resolve_imports(
        &self,
        library: LibraryHandle,
        handler: Option<LibraryTagHandler>,
        imports: &[(LibraryTag, String)],
    ) -> Result<(), ApiError> {
        if imports.is_empty() {
            return Ok(());
        }
        let handler = handler.ok_or_else(|| ApiError::new("no library tag handler installed"))?;

        for (tag, url) in imports {
            let canonical = match handler(LibraryTag::CanonicalizeUrl, Some(library), url.as_str())? {
                TagResult::Url(canonical) => canonical,
                TagResult::Library(_) => {
                    return Err(ApiError::new(format!("'{}' did not canonicalize to a URL", url)))
                }
            };
            let import = match handler(*tag, Some(library), canonical.as_str())? {
                TagResult::Library(import) => import,
                TagResult::Url(_) => {
                    return Err(ApiError::new(format!("'{}' did not load a library", canonical)))
                }
            };
            self.state
                .lock()
                .current_mut()?
                .library_mut(library)?
                .imports
                .push(import);
        }
        Ok(())
    }

    fn intrinsic(
        &self,
        url: &str,
        function: &str,
        args: &[Value],
    ) -> Option<Result<Value, ApiError>> {
        let string = |index: usize| -> Result<String, ApiError> {
            args.get(index)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ApiError::new(format!("{}: argument {} must be a string", function, index)))
        };

        let result = match (url, function) {
            (BUILTIN_LIBRARY, RESOLVE_SCRIPT_URI) => string(0).and_then(|cwd| {
                Ok(Value::String(resolve_script_uri(&cwd, &string(1)?)))
            }),
            (BUILTIN_LIBRARY, FILE_PATH_FROM_URI) => string(0).map(|uri| {
                Value::String(uri.strip_prefix("file://").unwrap_or(&uri).to_string())
            }),
            (DART_IO_LIBRARY, GET_TIMER_FACTORY) => Ok(Value::from(TIMER_FACTORY)),
            (ISOLATE_LIBRARY, SET_TIMER_FACTORY) => {
                let factory = args.first().cloned().unwrap_or_default();
                self.state
                    .lock()
                    .current_mut()
                    .map(|isolate| {
                        isolate.timer_factory = Some(factory);
                        Value::Null
                    })
            }
            _ => return None,
        };
        Some(result)
    }

    fn execute(&self, statements: &[Statement]) -> Result<Value, ApiError> {
        let mut vars: HashMap<String, Value> = HashMap::new();
        let mut last = Value::Null;

        for statement in statements {
            match statement {
                Statement::Call {
                    target,
                    library,
                    identifier,
                    args,
                } => {
                    let values = args
                        .iter()
                        .map(|arg| match arg {
                            Arg::Literal(value) => Ok(value.clone()),
                            Arg::Var(name) => vars
                                .get(name)
                                .cloned()
                                .ok_or_else(|| ApiError::new(format!("undefined variable ${}", name))),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let (result, values) = self.call_native(library, identifier, values)?;
                    for (arg, value) in args.iter().zip(values) {
                        if let Arg::Var(name) = arg {
                            vars.insert(name.clone(), value);
                        }
                    }
                    if let Some(target) = target {
                        vars.insert(target.clone(), result.clone());
                    }
                    last = result;
                }
                Statement::New {
                    target,
                    library,
                    constructor,
                } => {
                    let class = constructor
                        .split(CALL_SEPARATOR)
                        .next()
                        .unwrap_or(constructor);
                    let instance = Value::Instance(NativeInstance::new(class));
                    self.call_native(library, constructor, vec![instance.clone()])?;
                    vars.insert(target.clone(), instance);
                }
                Statement::Spawn(uri) => {
                    let (hooks, spawner) = {
                        let state = self.state.lock();
                        (state.hooks.clone(), state.current)
                    };
                    let hooks = hooks.ok_or_else(|| ApiError::new("runtime is not initialized"))?;
                    hooks.create_isolate(uri, "main", spawner)?;
                }
                Statement::Throw(message) => return Err(ApiError::new(message.clone())),
            }
        }
        Ok(last)
    }

    fn call_native(
        &self,
        url: &str,
        identifier: &str,
        values: Vec<Value>,
    ) -> Result<(Value, Vec<Value>), ApiError> {
        let resolver = {
            let state = self.state.lock();
            let isolate = state.current()?;
            let handle = isolate
                .by_url
                .get(url)
                .ok_or_else(|| ApiError::new(format!("library '{}' is not loaded", url)))?;
            isolate.library(*handle)?.resolver.clone()
        };
        self.record(RuntimeEvent::ResolveNative {
            library: url.to_string(),
            identifier: identifier.to_string(),
        });

        let resolver = resolver
            .ok_or_else(|| ApiError::new(format!("library '{}' has no native resolver", url)))?;
        let function = resolver.resolve(identifier, values.len()).ok_or_else(|| {
            ApiError::new(format!("native function '{}' not found in '{}'", identifier, url))
        })?;

        let mut args = NativeArguments::new(values);
        let result = function(&mut args).map_err(|e| ApiError::new(format!("{}: {}", identifier, e)))?;
        Ok((result, args.into_values()))
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryContext for MockRuntime {
    fn lookup_library(&self, url: &str) -> Result<Option<LibraryHandle>, ApiError> {
        self.record(RuntimeEvent::LookupLibrary(url.to_string()));
        let state = self.state.lock();
        state.fault(url)?;
        Ok(state.current()?.by_url.get(url).copied())
    }

    fn invoke(
        &self,
        library: LibraryHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, ApiError> {
        let (url, snapshot, body, fault) = {
            let state = self.state.lock();
            let target = state.current()?.library(library)?;
            let fault = state
                .invoke_faults
                .get(&(target.url.clone(), function.to_string()))
                .cloned();
            (
                target.url.clone(),
                target.snapshot,
                target.functions.get(function).cloned(),
                fault,
            )
        };
        self.record(RuntimeEvent::Invoke {
            library: url.clone(),
            function: function.to_string(),
        });
        if let Some(message) = fault {
            return Err(ApiError::new(message));
        }

        if snapshot {
            if let Some(result) = self.intrinsic(&url, function, &args) {
                return result;
            }
        }
        match body {
            Some(body) => self.execute(&body),
            None => Err(ApiError::new(format!(
                "No top-level method '{}' in '{}'",
                function, url
            ))),
        }
    }
}

impl ScriptRuntime for MockRuntime {
    fn set_flags(&self, flags: &[String]) -> Result<(), ApiError> {
        self.record(RuntimeEvent::SetFlags(flags.to_vec()));
        self.state.lock().flags = flags.to_vec();
        Ok(())
    }

    fn initialize(&self, hooks: Arc<dyn IsolateHooks>) -> Result<(), ApiError> {
        self.record(RuntimeEvent::Initialize);
        let mut state = self.state.lock();
        state.initialize_count += 1;
        state.hooks = Some(hooks);
        Ok(())
    }

    fn create_isolate(
        &self,
        script_uri: &str,
        _entry_point: &str,
        _snapshot: Option<&[u8]>,
    ) -> Result<IsolateHandle, ApiError> {
        self.record(RuntimeEvent::CreateIsolate(script_uri.to_string()));
        let mut state = self.state.lock();
        state.fault(script_uri)?;
        if state.current.is_some() {
            return Err(ApiError::new("cannot create an isolate while another is current"));
        }

        let mut isolate = MockIsolate::default();
        for url in &self.snapshot {
            let handle = state.next_library();
            isolate.libraries.insert(
                handle,
                MockLibrary {
                    url: url.clone(),
                    snapshot: true,
                    functions: HashMap::new(),
                    imports: Vec::new(),
                    resolver: None,
                },
            );
            isolate.by_url.insert(url.clone(), handle);
        }

        state.next_isolate += 1;
        let handle = IsolateHandle::new(state.next_isolate);
        state.isolates.insert(handle, isolate);
        state.current = Some(handle);
        Ok(handle)
    }

    fn current_isolate(&self) -> Option<IsolateHandle> {
        self.state.lock().current
    }

    fn enter_isolate(&self, isolate: IsolateHandle) -> Result<(), ApiError> {
        self.record(RuntimeEvent::EnterIsolate(isolate));
        let mut state = self.state.lock();
        if state.current.is_some() {
            return Err(ApiError::new("an isolate is already current"));
        }
        if !state.isolates.contains_key(&isolate) {
            return Err(ApiError::new(format!("{:?} does not exist", isolate)));
        }
        state.current = Some(isolate);
        Ok(())
    }

    fn exit_isolate(&self) {
        self.record(RuntimeEvent::ExitIsolate);
        self.state.lock().current = None;
    }

    fn shutdown_isolate(&self) {
        let (handle, hooks) = {
            let state = self.state.lock();
            match state.current {
                Some(handle) => (handle, state.hooks.clone()),
                None => return,
            }
        };
        self.record(RuntimeEvent::ShutdownIsolate(handle));
        if let Some(hooks) = hooks {
            hooks.shutdown_isolate(handle);
        }
        let mut state = self.state.lock();
        state.isolates.remove(&handle);
        state.current = None;
    }

    fn enter_scope(&self) {
        self.record(RuntimeEvent::EnterScope);
        if let Ok(isolate) = self.state.lock().current_mut() {
            isolate.scope_depth += 1;
        }
    }

    fn exit_scope(&self) {
        self.record(RuntimeEvent::ExitScope);
        if let Ok(isolate) = self.state.lock().current_mut() {
            isolate.scope_depth = isolate.scope_depth.saturating_sub(1);
        }
    }

    fn set_library_tag_handler(&self, handler: LibraryTagHandler) -> Result<(), ApiError> {
        self.record(RuntimeEvent::SetTagHandler);
        self.state.lock().current_mut()?.tag_handler = Some(handler);
        Ok(())
    }

    fn load_library(&self, url: &str, source: &str) -> Result<LibraryHandle, ApiError> {
        self.record(RuntimeEvent::LoadLibrary(url.to_string()));
        self.compile(url, source, false)
    }

    fn load_script(&self, url: &str, source: &str) -> Result<LibraryHandle, ApiError> {
        self.record(RuntimeEvent::LoadScript(url.to_string()));
        self.compile(url, source, true)
    }

    fn import_library(&self, library: LibraryHandle, import: LibraryHandle) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let isolate = state.current_mut()?;
        let import_url = isolate.library(import)?.url.clone();
        let target = isolate.library_mut(library)?;
        target.imports.push(import);
        let event = RuntimeEvent::ImportLibrary {
            library: target.url.clone(),
            import: import_url,
        };
        drop(state);
        self.record(event);
        Ok(())
    }

    fn set_native_resolver(
        &self,
        library: LibraryHandle,
        resolver: Option<Arc<dyn NativeLibrary>>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let target = state.current_mut()?.library_mut(library)?;
        let event = RuntimeEvent::SetNativeResolver {
            library: target.url.clone(),
            attached: resolver.is_some(),
        };
        target.resolver = resolver;
        drop(state);
        self.record(event);
        Ok(())
    }

    fn run_loop(&self) -> Result<(), ApiError> {
        self.record(RuntimeEvent::RunLoop);
        Ok(())
    }
}

// ============================================================================
// In-memory sources
// ============================================================================

/// [`SourceProvider`] over a map of paths to source text
#[derive(Debug, Default)]
pub struct MemorySources {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl MemorySources {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.files.write().insert(path.into(), source.into());
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(self, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }
}

impl SourceProvider for MemorySources {
    fn read_source(&self, path: &Path) -> Result<String, SourceError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let script = parse_script(
            "file:///app/main.dart",
            "#library('app');\n#import('dart:io');\nimport embed:input\n\
             def main\n  new $s embed:input GamePadState_New\n  $v = call embed:input GamePad_GetState 0 $s\nend\n",
        )
        .unwrap();
        assert_eq!(
            script.imports,
            vec![
                (LibraryTag::Import, "dart:io".to_string()),
                (LibraryTag::Import, "embed:input".to_string())
            ]
        );
        assert_eq!(script.functions["main"].len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_script("x", "def main\n  jump\nend\n").unwrap_err();
        assert_eq!(err.message, "x:2: unexpected statement 'jump'");

        let err = parse_script("x", "def main\n").unwrap_err();
        assert!(err.message.contains("missing 'end'"));

        let err = parse_script("x", "def main\n  call a B_C $\nend\n").unwrap_err();
        assert!(err.message.contains("expected a $variable"));
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse_arg("12"), Ok(Arg::Literal(Value::Int(12)))));
        assert!(matches!(parse_arg("0.5"), Ok(Arg::Literal(Value::Double(_)))));
        assert!(matches!(parse_arg("\"hi\""), Ok(Arg::Literal(Value::String(ref s))) if s == "hi"));
        assert!(matches!(parse_arg("bytes:4"), Ok(Arg::Literal(Value::Bytes(ref b))) if b.len() == 4));
        assert!(matches!(parse_arg("$x"), Ok(Arg::Var(ref v)) if v == "x"));
        assert!(parse_arg("what").is_err());
    }

    #[test]
    fn test_isolate_starts_with_snapshot() {
        let runtime = MockRuntime::with_snapshot(["dart:core", "dart:io"]);
        let isolate = runtime.create_isolate("main.dart", "main", None).unwrap();
        assert_eq!(runtime.current_isolate(), Some(isolate));
        assert!(runtime.lookup_library("dart:io").unwrap().is_some());
        assert!(runtime.lookup_library("dart:json").unwrap().is_none());
        assert!(runtime.create_isolate("other.dart", "main", None).is_err());

        runtime.shutdown_isolate();
        assert_eq!(runtime.live_isolates(), 0);
        assert_eq!(runtime.current_isolate(), None);
    }

    #[test]
    fn test_uri_intrinsics() {
        let runtime = MockRuntime::new();
        runtime.create_isolate("main.dart", "main", None).unwrap();
        let core = runtime.lookup_library("dart:builtin").unwrap().unwrap();

        let resolve = |uri: &str| {
            runtime
                .invoke(
                    core,
                    RESOLVE_SCRIPT_URI,
                    vec![Value::from("/app/"), Value::from(uri), Value::Bool(false)],
                )
                .unwrap()
        };
        assert_eq!(resolve("main.dart"), Value::from("file:///app/main.dart"));
        assert_eq!(resolve("/abs/main.dart"), Value::from("file:///abs/main.dart"));
        assert_eq!(resolve("http://host/x.dart"), Value::from("http://host/x.dart"));

        let path = runtime
            .invoke(
                core,
                FILE_PATH_FROM_URI,
                vec![Value::from("file:///app/main.dart"), Value::Bool(false)],
            )
            .unwrap();
        assert_eq!(path, Value::from("/app/main.dart"));
    }

    #[test]
    fn test_faults() {
        let runtime = MockRuntime::new();
        runtime.inject_fault("dart:io", "io is broken");
        runtime.create_isolate("main.dart", "main", None).unwrap();
        assert_eq!(
            runtime.lookup_library("dart:io").unwrap_err().message,
            "io is broken"
        );

        runtime.clear_faults();
        assert!(runtime.lookup_library("dart:io").unwrap().is_some());
    }

    #[test]
    fn test_memory_sources() {
        let sources = MemorySources::new().with("/app/main.dart", "def main\nend\n");
        assert!(sources.read_source(Path::new("/app/main.dart")).is_ok());
        assert!(matches!(
            sources.read_source(Path::new("/app/other.dart")),
            Err(SourceError::NotFound(_))
        ));
    }
}
