//! `hostvm resolve` - look a native up by identifier and argument count

use super::native_library;
use anyhow::bail;
use hostvm_sdk::{fnv1a_hash, split_and_hash};

pub fn execute(library: &str, identifier: &str, argc: usize) -> anyhow::Result<()> {
    let natives = native_library(library)?;

    // The table panics on an argument-count mismatch; report it instead.
    let registered = natives
        .entries()
        .into_iter()
        .find(|(name, _)| name == identifier);
    if let Some((_, expected)) = registered {
        if expected != argc {
            bail!(
                "{} is registered with {} arguments, not {}",
                identifier,
                expected,
                argc
            );
        }
    }

    match split_and_hash(identifier) {
        Ok(call) => println!(
            "{}: class {:#010x} method {:#010x} (flat {:#010x})",
            identifier,
            call.class_hash,
            call.method_hash,
            fnv1a_hash(identifier)
        ),
        Err(_) => println!("{}: flat {:#010x}", identifier, fnv1a_hash(identifier)),
    }

    if natives.resolve(identifier, argc).is_some() {
        println!("resolved in {}", library);
        Ok(())
    } else {
        bail!("{} does not resolve in {}", identifier, library)
    }
}
