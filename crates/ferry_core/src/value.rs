//! Script-side values
//!
//! `ScriptValue` is what local code hands to `Bridge::enqueue_call`: the
//! scripting runtime's dynamic values, including the kinds that can never
//! cross the bridge (functions, symbols, bigints, non-finite numbers).
//! Arrays and objects are shared heap handles with reference identity, so
//! the same container can be reachable twice or contain itself.
//!
//! Once a container has been enqueued it is frozen; later mutation fails with
//! `BridgeError::MutationAfterEnqueue` instead of silently diverging from what
//! was sent.

use crate::error::BridgeError;
use serde_json::Value;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(String),
    Function(String),
    Array(ScriptArray),
    Object(ScriptObject),
}

impl ScriptValue {
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = ScriptValue>,
    {
        ScriptValue::Array(ScriptArray::new(items))
    }

    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        ScriptValue::Object(ScriptObject::new(entries))
    }
}

// Containers print shallowly: a cyclic value must not recurse forever.
impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{b}"),
            ScriptValue::Number(n) => write!(f, "{n}"),
            ScriptValue::BigInt(n) => write!(f, "{n}n"),
            ScriptValue::String(s) => write!(f, "{s:?}"),
            ScriptValue::Symbol(s) => write!(f, "Symbol({s})"),
            ScriptValue::Function(name) => write!(f, "[Function {name}]"),
            ScriptValue::Array(array) => write!(f, "[Array({})]", array.len()),
            ScriptValue::Object(object) => write!(f, "[Object({})]", object.len()),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Number(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Number(value as f64)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(b),
            Value::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => ScriptValue::String(s),
            Value::Array(items) => ScriptValue::array(items.into_iter().map(ScriptValue::from)),
            Value::Object(map) => {
                ScriptValue::object(map.into_iter().map(|(k, v)| (k, ScriptValue::from(v))))
            }
        }
    }
}

struct HeapCell<T> {
    items: RefCell<T>,
    frozen: Cell<bool>,
}

impl<T> HeapCell<T> {
    fn new(items: T) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
            frozen: Cell::new(false),
        })
    }

    fn check_mutable(&self, what: &str) -> Result<(), BridgeError> {
        if self.frozen.get() {
            tracing::error!(
                target: "ferry::bridge",
                what,
                "attempted to mutate a value that was already sent across the bridge"
            );
            return Err(BridgeError::MutationAfterEnqueue {
                what: what.to_string(),
            });
        }
        Ok(())
    }
}

/// Shared, identity-bearing script array.
#[derive(Clone)]
pub struct ScriptArray(Rc<HeapCell<Vec<ScriptValue>>>);

impl ScriptArray {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = ScriptValue>,
    {
        Self(HeapCell::new(items.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ScriptValue> {
        self.0.items.borrow().get(index).cloned()
    }

    pub fn push(&self, value: ScriptValue) -> Result<(), BridgeError> {
        self.0.check_mutable("array")?;
        self.0.items.borrow_mut().push(value);
        Ok(())
    }

    pub fn set(&self, index: usize, value: ScriptValue) -> Result<(), BridgeError> {
        self.0.check_mutable("array element")?;
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, ScriptValue::Undefined);
        }
        items[index] = value;
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn ptr_eq(&self, other: &ScriptArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn items(&self) -> Ref<'_, Vec<ScriptValue>> {
        self.0.items.borrow()
    }

    pub(crate) fn freeze(&self) {
        self.0.frozen.set(true);
    }
}

/// Shared, identity-bearing script object. Keys iterate in sorted order.
#[derive(Clone)]
pub struct ScriptObject(Rc<HeapCell<BTreeMap<String, ScriptValue>>>);

impl ScriptObject {
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        Self(HeapCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<ScriptValue> {
        self.0.items.borrow().get(key).cloned()
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        value: ScriptValue,
    ) -> Result<Option<ScriptValue>, BridgeError> {
        self.0.check_mutable("object property")?;
        Ok(self.0.items.borrow_mut().insert(key.into(), value))
    }

    pub fn remove(&self, key: &str) -> Result<Option<ScriptValue>, BridgeError> {
        self.0.check_mutable("object property")?;
        Ok(self.0.items.borrow_mut().remove(key))
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn ptr_eq(&self, other: &ScriptObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn entries(&self) -> Ref<'_, BTreeMap<String, ScriptValue>> {
        self.0.items.borrow()
    }

    pub(crate) fn freeze(&self) {
        self.0.frozen.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_builds_fresh_containers() {
        let value = ScriptValue::from(json!({ "a": [1, 2], "b": { "c": null } }));
        let ScriptValue::Object(object) = value else {
            panic!("expected object");
        };
        assert_eq!(object.len(), 2);
        match object.get("a") {
            Some(ScriptValue::Array(array)) => assert_eq!(array.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clones_share_identity() {
        let array = ScriptArray::new([ScriptValue::from(1i64)]);
        let alias = array.clone();
        alias.push(ScriptValue::from(2i64)).unwrap();
        assert_eq!(array.len(), 2);
        assert!(array.ptr_eq(&alias));
        assert!(!array.ptr_eq(&ScriptArray::new([])));
    }

    #[test]
    fn frozen_containers_reject_mutation() {
        let object = ScriptObject::new([("k", ScriptValue::from("v"))]);
        object.freeze();
        assert!(matches!(
            object.insert("k", ScriptValue::Null),
            Err(BridgeError::MutationAfterEnqueue { .. })
        ));
        assert!(matches!(
            object.remove("k"),
            Err(BridgeError::MutationAfterEnqueue { .. })
        ));
        assert!(matches!(object.get("k"), Some(ScriptValue::String(s)) if s == "v"));

        let array = ScriptArray::new([]);
        array.freeze();
        assert!(array.push(ScriptValue::Null).is_err());
        assert!(array.set(3, ScriptValue::Null).is_err());
        assert!(array.is_empty());
    }

    #[test]
    fn set_past_end_pads_with_undefined() {
        let array = ScriptArray::new([]);
        array.set(2, ScriptValue::from(true)).unwrap();
        assert_eq!(array.len(), 3);
        assert!(matches!(array.get(0), Some(ScriptValue::Undefined)));
    }
}
