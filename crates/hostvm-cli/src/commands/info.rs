//! `hostvm info` - configuration and libraries

use super::{load_config, native_libraries};
use hostvm_core::builtins::builtin_libraries;
use std::path::PathBuf;

pub fn execute(config: Option<PathBuf>) -> anyhow::Result<()> {
    println!("HostVM v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);

    let (config, path) = load_config(config)?;
    match &path {
        Some(path) => println!("Config:       {}", path.display()),
        None => println!("Config:       (defaults)"),
    }
    println!("Entry point:  {}", config.entry_point);
    if !config.flags.is_empty() {
        println!("Flags:        {}", config.flags.join(" "));
    }
    if let Some(snapshot) = &config.snapshot {
        println!("Snapshot:     {}", snapshot.display());
    }
    if let Some(dir) = &config.working_dir {
        println!("Working dir:  {}", dir.display());
    }

    let natives = native_libraries();
    println!();
    println!("Builtin libraries:");
    for library in builtin_libraries() {
        let count = natives
            .iter()
            .find(|(name, _)| *name == library.name())
            .map_or(0, |(_, n)| n.entries().len());
        if count > 0 {
            println!("  {:<16} {} natives", library.name(), count);
        } else {
            println!("  {:<16} snapshot", library.name());
        }
    }

    if !config.libraries.is_empty() {
        println!();
        println!("Configured libraries:");
        for library in &config.libraries {
            println!("  {:<16} {}", library.name, library.path.display());
        }
    }

    println!();
    println!("Environment:");
    match std::env::var("HOSTVM_LOG") {
        Ok(value) => println!("  HOSTVM_LOG = {}", value),
        Err(_) => println!("  HOSTVM_LOG   (not set)"),
    }
    Ok(())
}
