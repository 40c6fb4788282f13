//! Argument encoding for outbound calls
//!
//! Converts script values into wire values. Every offending location is
//! collected (and logged) before the call is rejected, so a single warning
//! burst names all of them. Containers are frozen only when the whole
//! argument list encodes cleanly.

use crate::error::{ArgumentIssue, BridgeError, UnserializableReason};
use crate::value::{ScriptArray, ScriptObject, ScriptValue};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;

/// Largest integer an f64 represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

enum PathSegment {
    Index(usize),
    Key(String),
}

enum Container {
    Array(ScriptArray),
    Object(ScriptObject),
}

struct Encoder {
    seen: HashSet<usize>,
    path: Vec<PathSegment>,
    issues: Vec<ArgumentIssue>,
    visited: Vec<Container>,
}

/// Encode an outbound argument list, freezing every container it reaches.
pub fn encode_arguments(args: &[ScriptValue]) -> Result<Vec<Value>, BridgeError> {
    let mut encoder = Encoder {
        seen: HashSet::new(),
        path: Vec::new(),
        issues: Vec::new(),
        visited: Vec::new(),
    };

    let mut encoded = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        encoder.path.push(PathSegment::Index(index));
        encoded.push(encoder.encode(arg));
        encoder.path.pop();
    }

    if !encoder.issues.is_empty() {
        for issue in &encoder.issues {
            tracing::warn!(
                target: "ferry::bridge",
                path = %issue.path,
                "{}",
                issue.reason
            );
        }
        return Err(BridgeError::UnserializableArgument {
            issues: encoder.issues,
        });
    }

    for container in &encoder.visited {
        match container {
            Container::Array(array) => array.freeze(),
            Container::Object(object) => object.freeze(),
        }
    }

    Ok(encoded)
}

impl Encoder {
    fn encode(&mut self, value: &ScriptValue) -> Value {
        match value {
            ScriptValue::Undefined | ScriptValue::Null => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::String(s) => Value::String(s.clone()),
            ScriptValue::Number(n) => match number_value(*n) {
                Some(value) => value,
                None => self.reject(UnserializableReason::NonFinite { value: *n }),
            },
            ScriptValue::BigInt(_) => self.reject(UnserializableReason::BigInt),
            ScriptValue::Symbol(description) => self.reject(UnserializableReason::Symbol {
                description: description.clone(),
            }),
            ScriptValue::Function(name) => {
                self.reject(UnserializableReason::Function { name: name.clone() })
            }
            ScriptValue::Array(array) => self.encode_array(array),
            ScriptValue::Object(object) => self.encode_object(object),
        }
    }

    fn encode_array(&mut self, array: &ScriptArray) -> Value {
        if !self.seen.insert(array.identity()) {
            return self.reject(UnserializableReason::Aliased);
        }
        self.visited.push(Container::Array(array.clone()));

        let items = array.items();
        let mut encoded = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            self.path.push(PathSegment::Index(index));
            encoded.push(self.encode(item));
            self.path.pop();
        }
        Value::Array(encoded)
    }

    fn encode_object(&mut self, object: &ScriptObject) -> Value {
        if !self.seen.insert(object.identity()) {
            return self.reject(UnserializableReason::Aliased);
        }
        self.visited.push(Container::Object(object.clone()));

        let entries = object.entries();
        let mut encoded = Map::new();
        for (key, item) in entries.iter() {
            self.path.push(PathSegment::Key(key.clone()));
            let value = self.encode(item);
            self.path.pop();
            encoded.insert(key.clone(), value);
        }
        Value::Object(encoded)
    }

    fn reject(&mut self, reason: UnserializableReason) -> Value {
        self.issues.push(ArgumentIssue {
            path: self.render_path(),
            reason,
        });
        Value::Null
    }

    fn render_path(&self) -> String {
        let mut rendered = String::from("args");
        for segment in &self.path {
            match segment {
                PathSegment::Index(index) => rendered.push_str(&format!("[{index}]")),
                PathSegment::Key(key) => {
                    rendered.push('.');
                    rendered.push_str(key);
                }
            }
        }
        rendered
    }
}

/// Integral values within the exact range go out as JSON integers.
fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}
