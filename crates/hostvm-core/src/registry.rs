//! Library registry
//!
//! Builtin descriptors (`dart:` libraries) and user-registered libraries are
//! kept in separate lists. Lookups compare the identifier hash first and
//! then confirm the literal name.

use crate::error::RegistryError;
use crate::library::ScriptLibrary;
use hostvm_sdk::fnv1a_hash;
use std::sync::Arc;
use tracing::debug;

/// URL scheme reserved for builtin libraries
pub const BUILTIN_SCHEME: &str = "dart:";

/// Builtin and user library descriptors
#[derive(Debug, Default, Clone)]
pub struct LibraryRegistry {
    builtins: Vec<Arc<ScriptLibrary>>,
    libraries: Vec<Arc<ScriptLibrary>>,
}

impl LibraryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the builtin set
    pub fn set_builtins(&mut self, builtins: Vec<Arc<ScriptLibrary>>) {
        self.builtins = builtins;
    }

    /// Register a user library
    pub fn register(&mut self, library: ScriptLibrary) -> Result<Arc<ScriptLibrary>, RegistryError> {
        if library.name().starts_with(BUILTIN_SCHEME) {
            return Err(RegistryError::ReservedScheme(library.name().to_string()));
        }
        if let Some(existing) = self
            .libraries
            .iter()
            .find(|l| l.hashed_name() == library.hashed_name())
        {
            return Err(if existing.name() == library.name() {
                RegistryError::Duplicate(library.name().to_string())
            } else {
                RegistryError::HashCollision {
                    existing: existing.name().to_string(),
                    incoming: library.name().to_string(),
                    hash: library.hashed_name(),
                }
            });
        }

        debug!(library = library.name(), "registered script library");
        let library = Arc::new(library);
        self.libraries.push(Arc::clone(&library));
        Ok(library)
    }

    /// Find a builtin by URL
    pub fn builtin(&self, url: &str) -> Option<Arc<ScriptLibrary>> {
        find(&self.builtins, url)
    }

    /// Find a user library by URL
    pub fn library(&self, url: &str) -> Option<Arc<ScriptLibrary>> {
        find(&self.libraries, url)
    }

    /// Builtin descriptors, in registration order
    pub fn builtins(&self) -> &[Arc<ScriptLibrary>] {
        &self.builtins
    }

    /// User descriptors, in registration order
    pub fn libraries(&self) -> &[Arc<ScriptLibrary>] {
        &self.libraries
    }

    /// Every descriptor, builtins first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ScriptLibrary>> {
        self.builtins.iter().chain(self.libraries.iter())
    }

    /// Drop every descriptor
    pub fn clear(&mut self) {
        self.builtins.clear();
        self.libraries.clear();
    }
}

fn find(list: &[Arc<ScriptLibrary>], url: &str) -> Option<Arc<ScriptLibrary>> {
    let hash = fnv1a_hash(url);
    list.iter()
        .find(|l| l.hashed_name() == hash && l.name() == url)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LibrarySource;

    fn user(name: &str) -> ScriptLibrary {
        ScriptLibrary::new(name, Some(LibrarySource::Inline(String::new())), None)
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = LibraryRegistry::new();
        registry.register(user("embed:input")).unwrap();
        assert!(registry.library("embed:input").is_some());
        assert!(registry.library("embed:output").is_none());
        assert!(registry.builtin("embed:input").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = LibraryRegistry::new();
        registry.register(user("embed:input")).unwrap();
        assert_eq!(
            registry.register(user("embed:input")).unwrap_err(),
            RegistryError::Duplicate("embed:input".into())
        );
        assert_eq!(registry.libraries().len(), 1);
    }

    #[test]
    fn test_collision_rejected() {
        // FNV-1a collision pair
        let mut registry = LibraryRegistry::new();
        registry.register(user("costarring")).unwrap();
        let err = registry.register(user("liquid")).unwrap_err();
        assert!(matches!(err, RegistryError::HashCollision { ref existing, .. } if existing == "costarring"));
    }

    #[test]
    fn test_reserved_scheme() {
        let mut registry = LibraryRegistry::new();
        assert_eq!(
            registry.register(user("dart:io")).unwrap_err(),
            RegistryError::ReservedScheme("dart:io".into())
        );
    }

    #[test]
    fn test_builtins_separate() {
        let mut registry = LibraryRegistry::new();
        registry.set_builtins(vec![Arc::new(ScriptLibrary::new("dart:io", None, None))]);
        registry.register(user("embed:input")).unwrap();
        assert!(registry.builtin("dart:io").is_some());
        assert!(registry.library("dart:io").is_none());

        let names: Vec<_> = registry.iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, ["dart:io", "embed:input"]);

        registry.clear();
        assert_eq!(registry.iter().count(), 0);
    }
}
