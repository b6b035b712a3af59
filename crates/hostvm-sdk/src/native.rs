//! Native function signature and argument access

use crate::error::{NativeError, NativeResult};
use crate::value::{NativeInstance, Value};
use std::sync::Arc;

/// Host function invoked from script code.
///
/// Closures are allowed so a module can capture its data provider.
pub type NativeFn = Arc<dyn Fn(&mut NativeArguments) -> NativeResult + Send + Sync>;

/// Marshaled arguments of one native call.
///
/// Arguments are owned and mutable: list buffers passed by the script can be
/// filled in place and the runtime copies them back after the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeArguments {
    values: Vec<Value>,
}

impl NativeArguments {
    /// Wrap marshaled argument values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for an empty argument list
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw argument at `index`
    pub fn get(&self, index: usize) -> Result<&Value, NativeError> {
        self.values
            .get(index)
            .ok_or(NativeError::MissingArgument(index))
    }

    /// Integer argument
    pub fn int(&self, index: usize) -> Result<i64, NativeError> {
        let value = self.get(index)?;
        value.as_int().ok_or_else(|| mismatch(index, "int", value))
    }

    /// Double argument; integers widen
    pub fn double(&self, index: usize) -> Result<f64, NativeError> {
        let value = self.get(index)?;
        value.as_double().ok_or_else(|| mismatch(index, "double", value))
    }

    /// Boolean argument
    pub fn bool(&self, index: usize) -> Result<bool, NativeError> {
        let value = self.get(index)?;
        value.as_bool().ok_or_else(|| mismatch(index, "bool", value))
    }

    /// String argument
    pub fn string(&self, index: usize) -> Result<&str, NativeError> {
        let value = self.get(index)?;
        value.as_str().ok_or_else(|| mismatch(index, "String", value))
    }

    /// Optional string argument (`null` maps to `None`)
    pub fn opt_string(&self, index: usize) -> Result<Option<&str>, NativeError> {
        match self.get(index)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(mismatch(index, "String", other)),
        }
    }

    /// Byte buffer argument
    pub fn bytes(&self, index: usize) -> Result<&[u8], NativeError> {
        match self.get(index)? {
            Value::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch(index, "bytes", other)),
        }
    }

    /// Mutable byte buffer argument
    pub fn bytes_mut(&mut self, index: usize) -> Result<&mut Vec<u8>, NativeError> {
        match self.values.get_mut(index) {
            Some(Value::Bytes(bytes)) => Ok(bytes),
            Some(other) => Err(mismatch(index, "bytes", other)),
            None => Err(NativeError::MissingArgument(index)),
        }
    }

    /// List argument
    pub fn list(&self, index: usize) -> Result<&[Value], NativeError> {
        match self.get(index)? {
            Value::List(items) => Ok(items),
            other => Err(mismatch(index, "List", other)),
        }
    }

    /// Native-backed instance argument
    pub fn instance(&self, index: usize) -> Result<Arc<NativeInstance>, NativeError> {
        let value = self.get(index)?;
        value
            .as_instance()
            .cloned()
            .ok_or_else(|| mismatch(index, "instance", value))
    }

    /// Replace the argument at `index`
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), NativeError> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(NativeError::MissingArgument(index))?;
        *slot = value;
        Ok(())
    }

    /// All arguments
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the arguments, returning the (possibly mutated) values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for NativeArguments {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

fn mismatch(index: usize, expected: &'static str, got: &Value) -> NativeError {
    NativeError::TypeMismatch {
        index,
        expected,
        got: got.type_name(),
    }
}
