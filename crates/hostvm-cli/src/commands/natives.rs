//! `hostvm natives` - list native tables

use super::{native_libraries, native_library};
use hostvm_sdk::NativeLibrary;

pub fn execute(library: Option<&str>) -> anyhow::Result<()> {
    let libraries = match library {
        Some(name) => vec![(name.to_string(), native_library(name)?)],
        None => native_libraries()
            .into_iter()
            .map(|(name, library)| (name.to_string(), library))
            .collect(),
    };

    for (name, library) in libraries {
        print_library(&name, &*library);
    }
    Ok(())
}

fn print_library(name: &str, library: &dyn NativeLibrary) {
    let entries = library.entries();
    println!("{} ({} natives)", name, entries.len());
    for (identifier, argc) in entries {
        println!("  {:<36} {}", identifier, argc);
    }
}
