//! Display and Debug implementations for Value
//!
//! `Display` is the `to-string` conversion used when a value is written as
//! bytes; `Debug` (and [`Value::repr`]) is the quoted form that reads back
//! as source, used when values are printed as values.

use std::fmt;
use std::sync::Arc;

use super::*;

impl Value {
    /// The source-like representation of this value.
    pub fn repr(&self) -> String {
        format!("{:?}", self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Num(n) => write!(f, "{}", n),
            other => write!(f, "{:?}", other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "$nil"),
            Value::Bool(true) => write!(f, "$true"),
            Value::Bool(false) => write!(f, "$false"),
            Value::String(s) => write_quoted(s, f),
            Value::Num(n) => write!(f, "(num {})", n),

            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:?}", item)?;
                }
                write!(f, "]")
            }

            Value::Map(map) => {
                if map.is_empty() {
                    return write!(f, "[&]");
                }
                write!(f, "[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "&{:?}={:?}", k.value(), v)?;
                }
                write!(f, "]")
            }

            Value::Ns(ns) => write!(f, "<ns {:#x}>", ns.addr()),
            Value::Closure(c) => write!(f, "<closure {:p}>", Arc::as_ptr(c)),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::External(name) => write!(f, "<external {}>", name),
            Value::Exception(e) => write!(f, "<exception: {}>", e),
        }
    }
}

/// Characters that can appear in a bareword without quoting.
pub(crate) fn is_bareword_char(c: char) -> bool {
    c.is_alphanumeric() || "-_./:@~!%+,*?^".contains(c)
}

fn write_quoted(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !s.is_empty() && s.chars().all(is_bareword_char) {
        return write!(f, "{}", s);
    }
    write!(f, "'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_bareword_string() {
        assert_eq!(Value::from("foo").repr(), "foo");
    }

    #[test]
    fn test_repr_quoted_string() {
        assert_eq!(Value::from("a b").repr(), "'a b'");
        assert_eq!(Value::from("it's").repr(), "'it''s'");
        assert_eq!(Value::from("").repr(), "''");
    }

    #[test]
    fn test_repr_list_and_map() {
        let list = Value::list(vec![Value::from("a"), Value::int(1)]);
        assert_eq!(list.repr(), "[a (num 1)]");

        let map = Value::map(vec![(Value::from("k"), Value::from("v"))]);
        assert_eq!(map.repr(), "[&k=v]");
        assert_eq!(Value::map(Vec::new()).repr(), "[&]");
    }

    #[test]
    fn test_display_is_to_string() {
        assert_eq!(Value::from("a b").to_string(), "a b");
        assert_eq!(Value::float(0.5).to_string(), "0.5");
        assert_eq!(Value::Bool(true).to_string(), "$true");
    }
}
