//! Hashable wrapper for Value to enable use as map keys

use std::hash::{Hash, Hasher};

use super::{Num, Value};

/// A wrapper for Value that implements Hash and Eq.
///
/// Every value can be a map key. Scalars and lists hash by content;
/// namespaces and closures hash by identity, matching their equality.
/// Float keys treat `0.0` and `-0.0` as one key, and every NaN as one key.
#[derive(Debug, Clone)]
pub struct HashableValue(pub Value);

impl HashableValue {
    /// Unwrap the key.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Borrow the key.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for HashableValue {
    fn from(value: Value) -> Self {
        HashableValue(value)
    }
}

impl From<&str> for HashableValue {
    fn from(s: &str) -> Self {
        HashableValue(Value::string(s))
    }
}

/// Float bits with both zeros and all NaNs folded together.
fn float_key(f: f64) -> u64 {
    if f == 0.0 {
        0
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// Equality for keys, consistent with `hash_value`.
fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(Num::Float(x)), Value::Num(Num::Float(y))) => float_key(*x) == float_key(*y),
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| key_eq(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, v)| ys.get(k).is_some_and(|w| key_eq(v, w)))
        }
        _ => a == b,
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    // Hash the discriminant first
    std::mem::discriminant(value).hash(state);

    match value {
        Value::Nil => {}
        Value::Bool(b) => b.hash(state),
        Value::String(s) => s.hash(state),
        Value::Num(Num::Int(n)) => n.hash(state),
        Value::Num(Num::Rat(r)) => r.hash(state),
        Value::Num(Num::Float(f)) => float_key(*f).hash(state),
        Value::List(items) => {
            items.len().hash(state);
            for item in items.iter() {
                hash_value(item, state);
            }
        }
        Value::Map(map) => map.len().hash(state),
        Value::Ns(ns) => ns.addr().hash(state),
        Value::Closure(c) => (std::sync::Arc::as_ptr(c) as usize).hash(state),
        Value::Builtin(b) => b.name.hash(state),
        Value::External(name) => name.hash(state),
        Value::Exception(e) => e.to_string().hash(state),
    }
}

impl Hash for HashableValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

impl PartialEq for HashableValue {
    fn eq(&self, other: &Self) -> bool {
        key_eq(&self.0, &other.0)
    }
}

impl Eq for HashableValue {}
