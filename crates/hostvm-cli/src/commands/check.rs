//! `hostvm check` - dry-run script loading
//!
//! Builds the isolate exactly as the engine would, with the in-memory
//! runtime standing in for the interpreter. Import resolution, library
//! sources and native initializers are all exercised.

use super::load_config;
use hostvm_core::testing::MockRuntime;
use hostvm_core::{LibrarySource, VirtualMachine};
use hostvm_input::{input_library, GamePadSnapshot, INPUT_LIBRARY, INPUT_SOURCE};
use hostvm_sdk::NativeLibrary;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub fn execute(script: &str, config: Option<PathBuf>, run: bool) -> anyhow::Result<()> {
    let (config, _) = load_config(config)?;
    let runtime = Arc::new(MockRuntime::new());
    let vm = VirtualMachine::with_config(runtime.clone(), config);
    vm.initialize()?;

    let input: Arc<dyn NativeLibrary> = Arc::new(input_library(Arc::new(GamePadSnapshot::new())));
    vm.load_script_library(
        INPUT_LIBRARY,
        LibrarySource::Inline(INPUT_SOURCE.to_string()),
        Some(input),
    )?;

    let isolate = vm.load_script(script)?;
    info!(uri = isolate.script_uri(), "script loaded");
    println!("ok: {}", isolate.script_uri());
    for url in runtime.library_urls(isolate.handle()) {
        println!("  {}", url);
    }

    if run {
        let entry = vm.config().entry_point.clone();
        let result = isolate.invoke_function(&entry)?;
        println!("{}() returned {:?}", entry, result);
    }

    vm.terminate();
    Ok(())
}
