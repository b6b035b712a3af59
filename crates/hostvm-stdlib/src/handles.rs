//! Numeric handles for open host resources
//!
//! Scripts hold files, sockets, listeners and child processes as integer
//! handles. Each resource kind lives in its own registry.

use dashmap::DashMap;
use hostvm_sdk::{NativeArguments, NativeError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe map from handles to resources.
///
/// Handles start at 1 and are never reused, so 0 can mean "no resource".
pub struct HandleRegistry<T> {
    map: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T> HandleRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store a resource and return its handle
    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.map.insert(id, value);
        id
    }

    /// Run `f` with shared access to a resource
    pub fn with<R>(&self, id: u64, f: impl FnOnce(&T) -> R) -> Result<R, NativeError> {
        let entry = self.map.get(&id).ok_or(NativeError::InvalidHandle(id as i64))?;
        Ok(f(entry.value()))
    }

    /// Run `f` with exclusive access to a resource
    pub fn with_mut<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        let mut entry = self
            .map
            .get_mut(&id)
            .ok_or(NativeError::InvalidHandle(id as i64))?;
        Ok(f(entry.value_mut()))
    }

    /// Remove a resource, returning it
    pub fn remove(&self, id: u64) -> Option<T> {
        self.map.remove(&id).map(|(_, value)| value)
    }

    /// Whether the handle refers to a live resource
    pub fn contains(&self, id: u64) -> bool {
        self.map.contains_key(&id)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check for no live resources
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a handle argument
pub fn handle_arg(args: &NativeArguments, index: usize) -> Result<u64, NativeError> {
    let raw = args.int(index)?;
    u64::try_from(raw).map_err(|_| NativeError::InvalidHandle(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostvm_sdk::Value;

    #[test]
    fn test_insert_and_access() {
        let registry = HandleRegistry::new();
        let a = registry.insert(String::from("a"));
        let b = registry.insert(String::from("b"));
        assert_ne!(a, b);
        assert!(a > 0);

        registry.with_mut(a, |s| s.push('!')).unwrap();
        assert_eq!(registry.with(a, |s| s.clone()).unwrap(), "a!");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_removed_handle_is_invalid() {
        let registry = HandleRegistry::new();
        let id = registry.insert(5u8);
        assert_eq!(registry.remove(id), Some(5));
        assert!(!registry.contains(id));
        assert_eq!(
            registry.with(id, |v| *v),
            Err(NativeError::InvalidHandle(id as i64))
        );
    }

    #[test]
    fn test_negative_handle_arg() {
        let args = NativeArguments::new(vec![Value::Int(-1), Value::Int(3)]);
        assert_eq!(handle_arg(&args, 0), Err(NativeError::InvalidHandle(-1)));
        assert_eq!(handle_arg(&args, 1), Ok(3));
    }
}
