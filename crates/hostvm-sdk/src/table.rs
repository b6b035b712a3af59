//! Native symbol table
//!
//! Maps native call identifiers to host functions for one library. Two
//! levels are supported:
//!
//! - flat functions, keyed by the hash of the whole identifier (`Exit`,
//!   `Logger_PrintString`)
//! - class methods, keyed by class hash and then method hash
//!   (`File_Open` is method `Open` of class `File`)
//!
//! Resolution tries the flat level first. Every hash hit is confirmed
//! against the literal name, so a collision reads as a miss rather than a
//! call into the wrong function. Distinct names that collide at the same
//! level are rejected when the table is built.

use crate::error::{NativeResult, TableError};
use crate::hash::{fnv1a_hash, split_and_hash, CALL_SEPARATOR};
use crate::native::{NativeArguments, NativeFn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Entries
// ============================================================================

/// A registered native function
#[derive(Clone)]
pub struct NativeEntry {
    hash: u32,
    name: String,
    argument_count: usize,
    function: NativeFn,
}

impl NativeEntry {
    fn new(name: &str, argument_count: usize, function: NativeFn) -> Self {
        Self {
            hash: fnv1a_hash(name),
            name: name.to_string(),
            argument_count,
            function,
        }
    }

    /// Hash of the entry name at its level
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Entry name (method name for class entries)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected argument count
    pub fn argument_count(&self) -> usize {
        self.argument_count
    }

    /// Host function
    pub fn function(&self) -> &NativeFn {
        &self.function
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("hash", &format_args!("{:#010x}", self.hash))
            .field("name", &self.name)
            .field("argument_count", &self.argument_count)
            .finish()
    }
}

/// Methods of one native class
#[derive(Debug, Clone)]
pub struct NativeClassEntry {
    hash: u32,
    name: String,
    methods: FxHashMap<u32, NativeEntry>,
}

impl NativeClassEntry {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hash of the class name
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Registered methods, in no particular order
    pub fn methods(&self) -> impl Iterator<Item = &NativeEntry> {
        self.methods.values()
    }
}

// ============================================================================
// Table
// ============================================================================

/// Immutable two-level native symbol table
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    functions: FxHashMap<u32, NativeEntry>,
    classes: FxHashMap<u32, NativeClassEntry>,
}

impl NativeTable {
    /// Start building a table
    pub fn builder() -> NativeTableBuilder {
        NativeTableBuilder::default()
    }

    /// Resolve a native call identifier.
    ///
    /// Returns `None` when the identifier is not registered.
    ///
    /// # Panics
    /// Panics when the identifier is registered with a different argument
    /// count. That is an integration defect between the script declaration
    /// and the host table, not a runtime condition.
    pub fn resolve(&self, identifier: &str, argument_count: usize) -> Option<NativeFn> {
        let entry = self.lookup(identifier)?;
        if entry.argument_count != argument_count {
            panic!(
                "native '{}' is registered with {} arguments but called with {}",
                identifier, entry.argument_count, argument_count
            );
        }
        debug!(identifier, argument_count, "resolved native");
        Some(Arc::clone(&entry.function))
    }

    /// Find the entry for an identifier without checking the argument count
    pub fn lookup(&self, identifier: &str) -> Option<&NativeEntry> {
        if let Some(entry) = self.functions.get(&fnv1a_hash(identifier)) {
            if entry.name == identifier {
                return Some(entry);
            }
            warn!(
                requested = identifier,
                registered = entry.name.as_str(),
                "native hash matched a different name"
            );
        }

        let call = split_and_hash(identifier).ok()?;
        let class = self.classes.get(&call.class_hash)?;
        if class.name != call.class {
            warn!(
                requested = call.class,
                registered = class.name.as_str(),
                "native class hash matched a different name"
            );
            return None;
        }

        let method = class.methods.get(&call.method_hash)?;
        if method.name != call.method {
            warn!(
                requested = call.method,
                registered = method.name.as_str(),
                class = call.class,
                "native method hash matched a different name"
            );
            return None;
        }
        Some(method)
    }

    /// Registered `(qualified name, argument count)` pairs, sorted by name
    pub fn entries(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .functions
            .values()
            .map(|e| (e.name.clone(), e.argument_count))
            .chain(self.classes.values().flat_map(|class| {
                class.methods.values().map(move |m| {
                    (
                        format!("{}{}{}", class.name, CALL_SEPARATOR, m.name),
                        m.argument_count,
                    )
                })
            }))
            .collect();
        entries.sort();
        entries
    }

    /// Registered classes
    pub fn classes(&self) -> impl Iterator<Item = &NativeClassEntry> {
        self.classes.values()
    }

    /// Total number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len() + self.classes.values().map(|c| c.methods.len()).sum::<usize>()
    }

    /// Check for an empty table
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`NativeTable`].
///
/// Registration errors are collected and reported by [`build`](Self::build).
#[derive(Default)]
pub struct NativeTableBuilder {
    table: NativeTable,
    qualified: FxHashSet<String>,
    error: Option<TableError>,
}

impl NativeTableBuilder {
    /// Register a flat function under its full identifier
    pub fn function<F>(mut self, name: &str, argument_count: usize, function: F) -> Self
    where
        F: Fn(&mut NativeArguments) -> NativeResult + Send + Sync + 'static,
    {
        if self.error.is_none() && self.claim(name) {
            let entry = NativeEntry::new(name, argument_count, Arc::new(function));
            if let Err(e) = insert_entry(&mut self.table.functions, entry) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Register the methods of one class
    pub fn class(mut self, name: &str, define: impl FnOnce(ClassBuilder) -> ClassBuilder) -> Self {
        if self.error.is_some() {
            return self;
        }
        if name.is_empty() || name.contains(CALL_SEPARATOR) {
            self.error = Some(TableError::InvalidClassName(name.to_string()));
            return self;
        }

        let built = define(ClassBuilder {
            name: name.to_string(),
            methods: Vec::new(),
        });

        let hash = fnv1a_hash(name);
        let class = match self.table.classes.entry(hash) {
            Entry::Occupied(slot) if slot.get().name != name => {
                self.error = Some(TableError::HashCollision {
                    existing: slot.get().name.clone(),
                    incoming: name.to_string(),
                    hash,
                });
                return self;
            }
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(NativeClassEntry {
                hash,
                name: name.to_string(),
                methods: FxHashMap::default(),
            }),
        };

        for entry in built.methods {
            let qualified = format!("{}{}{}", name, CALL_SEPARATOR, entry.name);
            if !self.qualified.insert(qualified.clone()) {
                self.error = Some(TableError::Duplicate(qualified));
                return self;
            }
            if let Err(e) = insert_entry(&mut class.methods, entry) {
                self.error = Some(e);
                return self;
            }
        }
        self
    }

    /// Finish the table
    pub fn build(self) -> Result<NativeTable, TableError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.table),
        }
    }

    fn claim(&mut self, name: &str) -> bool {
        if self.qualified.insert(name.to_string()) {
            true
        } else {
            self.error = Some(TableError::Duplicate(name.to_string()));
            false
        }
    }
}

/// Collects the methods of one class for [`NativeTableBuilder::class`]
pub struct ClassBuilder {
    name: String,
    methods: Vec<NativeEntry>,
}

impl ClassBuilder {
    /// Register a method
    pub fn method<F>(mut self, name: &str, argument_count: usize, function: F) -> Self
    where
        F: Fn(&mut NativeArguments) -> NativeResult + Send + Sync + 'static,
    {
        self.methods
            .push(NativeEntry::new(name, argument_count, Arc::new(function)));
        self
    }

    /// Class being defined
    pub fn class_name(&self) -> &str {
        &self.name
    }
}

fn insert_entry(level: &mut FxHashMap<u32, NativeEntry>, entry: NativeEntry) -> Result<(), TableError> {
    match level.entry(entry.hash) {
        Entry::Occupied(slot) => {
            let existing = slot.get().name.clone();
            if existing == entry.name {
                Err(TableError::Duplicate(existing))
            } else {
                Err(TableError::HashCollision {
                    existing,
                    incoming: entry.name,
                    hash: entry.hash,
                })
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(entry);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample() -> NativeTable {
        NativeTable::builder()
            .function("Exit", 1, |_| Ok(Value::Null))
            .function("Logger_PrintString", 1, |_| Ok(Value::Int(7)))
            .class("Foo", |c| {
                c.method("Bar", 2, |args| Ok(Value::Int(args.int(0)? + args.int(1)?)))
                    .method("Read_List", 4, |_| Ok(Value::Null))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_class_method() {
        let table = sample();
        let f = table.resolve("Foo_Bar", 2).unwrap();
        let mut args = NativeArguments::new(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(f(&mut args).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_resolve_unregistered() {
        let table = sample();
        assert!(table.resolve("Foo_Baz", 2).is_none());
        assert!(table.resolve("Qux_Bar", 2).is_none());
        assert!(table.resolve("NoSeparator", 0).is_none());
    }

    #[test]
    #[should_panic(expected = "registered with 2 arguments but called with 3")]
    fn test_argument_count_mismatch_panics() {
        sample().resolve("Foo_Bar", 3);
    }

    #[test]
    fn test_flat_level_wins() {
        let table = sample();
        let f = table.resolve("Logger_PrintString", 1).unwrap();
        assert_eq!(f(&mut NativeArguments::default()).unwrap(), Value::Int(7));
        assert!(table.resolve("Exit", 1).is_some());
    }

    #[test]
    fn test_method_name_with_separator() {
        let table = sample();
        assert!(table.resolve("Foo_Read_List", 4).is_some());
    }

    #[test]
    fn test_same_function_each_resolve() {
        let table = sample();
        let a = table.resolve("Foo_Bar", 2).unwrap();
        let b = table.resolve("Foo_Bar", 2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_entries_sorted() {
        let entries = sample().entries();
        assert_eq!(
            entries,
            vec![
                ("Exit".to_string(), 1),
                ("Foo_Bar".to_string(), 2),
                ("Foo_Read_List".to_string(), 4),
                ("Logger_PrintString".to_string(), 1),
            ]
        );
        assert_eq!(sample().len(), 4);
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = NativeTable::builder()
            .class("Foo", |c| c.method("Bar", 1, |_| Ok(Value::Null)))
            .class("Foo", |c| c.method("Bar", 1, |_| Ok(Value::Null)))
            .build();
        assert_eq!(result.unwrap_err(), TableError::Duplicate("Foo_Bar".into()));

        let result = NativeTable::builder()
            .function("Exit", 1, |_| Ok(Value::Null))
            .function("Exit", 1, |_| Ok(Value::Null))
            .build();
        assert_eq!(result.unwrap_err(), TableError::Duplicate("Exit".into()));
    }

    #[test]
    fn test_class_split_across_calls() {
        let table = NativeTable::builder()
            .class("Foo", |c| c.method("A", 0, |_| Ok(Value::Null)))
            .class("Foo", |c| c.method("B", 0, |_| Ok(Value::Null)))
            .build()
            .unwrap();
        assert!(table.resolve("Foo_A", 0).is_some());
        assert!(table.resolve("Foo_B", 0).is_some());
        assert_eq!(table.classes().count(), 1);
    }

    #[test]
    fn test_bad_class_name() {
        let result = NativeTable::builder()
            .class("Foo_Bar", |c| c.method("X", 0, |_| Ok(Value::Null)))
            .build();
        assert!(matches!(result, Err(TableError::InvalidClassName(_))));

        let result = NativeTable::builder()
            .class("", |c| c.method("X", 0, |_| Ok(Value::Null)))
            .build();
        assert!(matches!(result, Err(TableError::InvalidClassName(_))));
    }

    #[test]
    fn test_hash_collision_detected() {
        // Classic 32-bit FNV-1a collision pair
        assert_eq!(fnv1a_hash("costarring"), fnv1a_hash("liquid"));
        let result = NativeTable::builder()
            .function("costarring", 0, |_| Ok(Value::Null))
            .function("liquid", 0, |_| Ok(Value::Null))
            .build();
        assert!(matches!(result, Err(TableError::HashCollision { .. })));
    }
}
