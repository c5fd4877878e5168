//! Dynamic values flowing through linked call sites.

use crate::types::TypeId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value.
///
/// Scalars map onto the well-known [`TypeId`] constants; objects carry their
/// registered type. Cloning is cheap (strings and objects are shared).
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Obj(Arc<ObjectValue>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn object(obj: ObjectValue) -> Self {
        Value::Obj(Arc::new(obj))
    }

    /// Runtime type of this value.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Unit => TypeId::UNIT,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Str(_) => TypeId::STR,
            Value::Obj(obj) => obj.type_id(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ObjectValue>> {
        match self {
            Value::Obj(obj) => Some(obj),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "unit"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Obj(obj) => write!(f, "<obj #{}>", obj.type_id().index()),
        }
    }
}

/// Heap object with a registered type and a small property map.
pub struct ObjectValue {
    type_id: TypeId,
    properties: RwLock<FxHashMap<Arc<str>, Value>>,
}

impl ObjectValue {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            properties: RwLock::new(FxHashMap::default()),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.properties.write().insert(Arc::from(name), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.properties.write().remove(name)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_id", &self.type_id)
            .field("properties", &self.properties.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_ids() {
        assert_eq!(Value::Unit.type_id(), TypeId::UNIT);
        assert_eq!(Value::Int(3).type_id(), TypeId::INT);
        assert_eq!(Value::str("x").type_id(), TypeId::STR);
    }

    #[test]
    fn test_object_identity_equality() {
        let a = Value::object(ObjectValue::new(TypeId::ANY));
        let b = a.clone();
        let c = Value::object(ObjectValue::new(TypeId::ANY));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_object_properties() {
        let obj = ObjectValue::new(TypeId::ANY);
        obj.set("color", Value::str("red"));
        assert_eq!(obj.get("color"), Some(Value::str("red")));
        assert_eq!(obj.remove("color"), Some(Value::str("red")));
        assert_eq!(obj.get("color"), None);
    }
}
