//! Value trait implementations: constructors, predicates, extractors, From traits, PartialEq

use std::sync::Arc;

use super::*;

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Arc::new(s.into()))
    }

    /// Create a list value
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    /// Create a map value from key/value pairs
    pub fn map(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Map(Arc::new(
            pairs
                .into_iter()
                .map(|(k, v)| (HashableValue(k), v))
                .collect(),
        ))
    }

    /// Create an integer value
    pub fn int(n: i64) -> Self {
        Value::Num(Num::Int(n))
    }

    /// Create a float value
    pub fn float(x: f64) -> Self {
        Value::Num(Num::Float(x))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Kind and Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// The user-visible kind name, as reported by `kind-of`.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Num(_) => "number",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Ns(_) => "ns",
            Value::Closure(_) | Value::Builtin(_) | Value::External(_) => "fn",
            Value::Exception(_) => "exception",
        }
    }

    /// Check if value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is callable (closure, builtin, or external command)
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Closure(_) | Value::Builtin(_) | Value::External(_)
        )
    }

    /// Truthiness: `$false`, `$nil` and exceptions are false, all else true.
    pub fn truthy(&self) -> bool {
        !matches!(
            self,
            Value::Bool(false) | Value::Nil | Value::Exception(_)
        )
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors
    // ═══════════════════════════════════════════════════════════════════

    /// Borrow the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Borrow the namespace handle, if this is a namespace.
    pub fn as_ns(&self) -> Option<&Namespace> {
        match self {
            Value::Ns(ns) => Some(ns),
            _ => None,
        }
    }

    /// Interpret the value as a number.
    ///
    /// Numbers pass through; strings are parsed with [`parse_num`].
    pub fn to_num(&self) -> Option<Num> {
        match self {
            Value::Num(n) => Some(*n),
            Value::String(s) => parse_num(s),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::new(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::float(x)
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Self {
        Value::Num(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Ns(ns)
    }
}

impl From<BuiltinFn> for Value {
    fn from(f: BuiltinFn) -> Self {
        Value::Builtin(f)
    }
}

impl From<Closure> for Value {
    fn from(c: Closure) -> Self {
        Value::Closure(Arc::new(c))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Equality
// ═══════════════════════════════════════════════════════════════════

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Ns(a), Value::Ns(b)) => a.same(b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::External(a), Value::External(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}
