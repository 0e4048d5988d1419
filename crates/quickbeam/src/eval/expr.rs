//! Word evaluation

use std::sync::Arc;

use crate::environment::{Frame, Namespace};
use crate::error::{EvalError, Reason};
use crate::frontend::{Operation, Source};
use crate::value::{Closure, HashableValue, Num, Signature, Value};

/// A word, evaluating to any number of values.
pub(crate) enum Expr {
    /// A bareword or quoted string
    Literal(Value),

    /// `$name` or `$@name`
    Variable { name: String, explode: bool },

    /// `(...)`: the output of a chunk
    Capture(Arc<dyn Operation>),

    /// `[...]`
    List(Vec<Expr>),

    /// `[&k=v ...]`
    Map(Vec<(Expr, Expr)>),

    /// `{ ... }`
    Lambda(Arc<LambdaDef>),

    /// `head[k][k2 k3]`
    Indexed { head: Box<Expr>, indices: Vec<Vec<Expr>> },

    /// Adjacent parts concatenated as strings
    Compound(Vec<Expr>),
}

/// Everything needed to build a closure when a lambda is evaluated.
pub(crate) struct LambdaDef {
    pub params: Vec<String>,
    pub rest: Option<usize>,
    pub options: Vec<(String, Expr)>,
    pub rest_options: Option<String>,
    pub body: Arc<dyn Operation>,
    pub source: Arc<Source>,
}

impl LambdaDef {
    /// Create a closure capturing the scope visible from `fm`.
    ///
    /// The local namespace is captured as a snapshot: cells are shared,
    /// names declared afterwards are not seen.
    pub(crate) fn instantiate(&self, fm: &mut Frame) -> Result<Closure, EvalError> {
        let mut sig = Signature::new();
        for (i, name) in self.params.iter().enumerate() {
            sig = if self.rest == Some(i) {
                sig.rest(name.clone())
            } else {
                sig.param(name.clone())
            };
        }
        for (name, default) in &self.options {
            let value = default.eval_one(fm, "option default")?;
            sig = sig.option(name.clone(), value);
        }
        if let Some(name) = &self.rest_options {
            sig = sig.rest_options(name.clone());
        }

        let captured: Vec<Namespace> = std::iter::once(fm.local.snapshot())
            .chain(fm.up.iter().cloned())
            .collect();
        Ok(Closure::new(
            sig,
            self.body.clone(),
            Arc::from(captured),
            self.source.clone(),
        ))
    }
}

impl Expr {
    /// Evaluate to all produced values.
    pub(crate) fn eval(&self, fm: &mut Frame) -> Result<Vec<Value>, EvalError> {
        match self {
            Expr::Literal(v) => Ok(vec![v.clone()]),
            Expr::Variable { name, explode } => {
                let value = fm
                    .lookup_value(name)
                    .ok_or_else(|| fm.exception(Reason::NoSuchVariable(name.clone())))?;
                if !explode {
                    return Ok(vec![value]);
                }
                match value.as_list() {
                    Some(items) => Ok(items.to_vec()),
                    None => Err(fm.exception(Reason::bad_value("exploded value", "list", &value))),
                }
            }
            Expr::Capture(op) => fm.capture_output(|fm| op.exec(fm)),
            Expr::List(items) => {
                let mut values = Vec::new();
                for item in items {
                    values.extend(item.eval(fm)?);
                }
                Ok(vec![Value::list(values)])
            }
            Expr::Map(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    entries.push((k.eval_one(fm, "map key")?, v.eval_one(fm, "map value")?));
                }
                Ok(vec![Value::map(entries)])
            }
            Expr::Lambda(def) => Ok(vec![Value::from(def.instantiate(fm)?)]),
            Expr::Indexed { head, indices } => {
                let mut values = head.eval(fm)?;
                for index in indices {
                    let mut keys = Vec::new();
                    for key in index {
                        keys.extend(key.eval(fm)?);
                    }
                    let mut next = Vec::with_capacity(values.len() * keys.len());
                    for base in &values {
                        for key in &keys {
                            next.push(index_value(fm, base, key)?);
                        }
                    }
                    values = next;
                }
                Ok(values)
            }
            Expr::Compound(parts) => {
                let mut acc = vec![String::new()];
                for part in parts {
                    let values = part.eval(fm)?;
                    let mut next = Vec::with_capacity(acc.len() * values.len());
                    for prefix in &acc {
                        for v in &values {
                            let piece = match v {
                                Value::String(s) => s.as_str().to_string(),
                                Value::Num(n) => n.to_string(),
                                other => {
                                    return Err(fm.exception(Reason::bad_value(
                                        "compound part",
                                        "string or number",
                                        other,
                                    )))
                                }
                            };
                            next.push(format!("{}{}", prefix, piece));
                        }
                    }
                    acc = next;
                }
                Ok(acc.into_iter().map(Value::from).collect())
            }
        }
    }

    /// Evaluate to exactly one value.
    pub(crate) fn eval_one(&self, fm: &mut Frame, what: &str) -> Result<Value, EvalError> {
        let mut values = self.eval(fm)?;
        if values.len() != 1 {
            return Err(fm.exception(Reason::ArityMismatch {
                what: what.to_string(),
                valid: "1".to_string(),
                actual: values.len(),
            }));
        }
        Ok(values.remove(0))
    }
}

/// `base[key]` for lists, maps and namespaces.
pub(crate) fn index_value(fm: &Frame, base: &Value, key: &Value) -> Result<Value, EvalError> {
    match base {
        Value::List(items) => {
            let i = list_index(key, items.len()).ok_or_else(|| {
                fm.exception(Reason::BadValue {
                    what: "index".to_string(),
                    valid: format!("integer from -{} to {}", items.len(), items.len().saturating_sub(1)),
                    actual: key.repr(),
                })
            })?;
            Ok(items[i].clone())
        }
        Value::Map(map) => map
            .get(&HashableValue::from(key.clone()))
            .cloned()
            .ok_or_else(|| fm.exception(Reason::NoSuchKey(key.repr()))),
        Value::Ns(ns) => key
            .as_str()
            .and_then(|name| ns.get(name))
            .ok_or_else(|| fm.exception(Reason::NoSuchKey(key.repr()))),
        other => Err(fm.exception(Reason::bad_value(
            "indexee",
            "list, map or namespace",
            other,
        ))),
    }
}

/// Resolve a possibly negative list index.
pub(crate) fn list_index(key: &Value, len: usize) -> Option<usize> {
    let i = match key.to_num()? {
        Num::Int(i) => i,
        _ => return None,
    };
    let len = i64::try_from(len).ok()?;
    let i = if i < 0 { i + len } else { i };
    if (0..len).contains(&i) {
        usize::try_from(i).ok()
    } else {
        None
    }
}
