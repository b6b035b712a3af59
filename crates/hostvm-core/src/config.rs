//! VM configuration (hostvm.toml)
//!
//! ```toml
//! flags = ["--enable_type_checks"]
//! snapshot = "build/snapshot.bin"
//! working_dir = "scripts"
//! entry_point = "main"
//!
//! [[library]]
//! name = "embed:util"
//! path = "lib/util.dart"
//! ```
//!
//! Relative paths in a file loaded with [`VmConfig::from_file`] are taken
//! relative to the file's directory.

use crate::error::ConfigError;
use crate::registry::BUILTIN_SCHEME;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmConfig {
    /// Interpreter flags
    #[serde(default)]
    pub flags: Vec<String>,

    /// Snapshot every isolate starts from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,

    /// Directory script URIs resolve against (default: process cwd)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Function `load_script` callers run
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// File-backed user libraries
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryConfig>,
}

/// A `[[library]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Import URL
    pub name: String,
    /// Source file
    pub path: PathBuf,
}

fn default_entry_point() -> String {
    "main".to_string()
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            snapshot: None,
            working_dir: None,
            entry_point: default_entry_point(),
            libraries: Vec::new(),
        }
    }
}

impl VmConfig {
    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Parse and validate config text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: VmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names and the entry point
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_point.is_empty() {
            return Err(ConfigError::ValidationError(
                "entry_point cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for library in &self.libraries {
            if library.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "library name cannot be empty".to_string(),
                ));
            }
            if library.name.starts_with(BUILTIN_SCHEME) {
                return Err(ConfigError::ValidationError(format!(
                    "library '{}' uses the reserved '{}' scheme",
                    library.name, BUILTIN_SCHEME
                )));
            }
            if !seen.insert(library.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "library '{}' is listed twice",
                    library.name
                )));
            }
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(snapshot) = &mut self.snapshot {
            join(snapshot);
        }
        if let Some(dir) = &mut self.working_dir {
            join(dir);
        }
        for library in &mut self.libraries {
            join(&mut library.path);
        }
    }
}
