//! Values marshaled across the host/script boundary
//!
//! The runtime converts interpreter handles into `Value`s before calling a
//! native function and converts the returned `Value` back afterwards.
//! Arguments are passed by value; the runtime writes mutated list and byte
//! buffers back to the script objects they came from.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A marshaled script value
#[derive(Clone, Default)]
pub enum Value {
    /// `null`
    #[default]
    Null,
    /// `bool`
    Bool(bool),
    /// `int`
    Int(i64),
    /// `double`
    Double(f64),
    /// `String`
    String(String),
    /// Byte list (`List<int>` with byte elements)
    Bytes(Vec<u8>),
    /// Generic list
    List(Vec<Value>),
    /// Script object backed by a native peer
    Instance(Arc<NativeInstance>),
}

impl Value {
    /// Type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "String",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "List",
            Value::Instance(_) => "instance",
        }
    }

    /// Check for `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as double. Integers widen.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as native-backed instance
    pub fn as_instance(&self) -> Option<&Arc<NativeInstance>> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Double(d) => write!(f, "Double({})", d),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Instance(instance) => write!(f, "Instance({})", instance.class_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<f32> for Value {
    fn from(d: f32) -> Self {
        Value::Double(f64::from(d))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

// ============================================================================
// Native-backed instances
// ============================================================================

type Peer = Box<dyn Any + Send + Sync>;

/// Script object carrying a native peer.
///
/// The peer replaces the raw pointer a native constructor would otherwise
/// store in an instance field. It is dropped together with the instance, so
/// no finalizer registration is needed.
pub struct NativeInstance {
    class_name: String,
    peer: Mutex<Option<Peer>>,
}

impl NativeInstance {
    /// Create an instance of the named script class with no peer
    pub fn new(class_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            class_name: class_name.into(),
            peer: Mutex::new(None),
        })
    }

    /// Script class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Whether a peer is attached
    pub fn has_peer(&self) -> bool {
        self.peer.lock().is_some()
    }

    /// Attach a peer, replacing any previous one
    pub fn set_peer<T: Any + Send + Sync>(&self, value: T) {
        *self.peer.lock() = Some(Box::new(value));
    }

    /// Borrow the peer as `T`. Returns `None` if absent or of another type.
    pub fn with_peer<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.peer.lock();
        guard.as_ref()?.downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the peer as `T`
    pub fn with_peer_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.peer.lock();
        guard.as_mut()?.downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for NativeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeInstance")
            .field("class_name", &self.class_name)
            .field("has_peer", &self.has_peer())
            .finish()
    }
}
