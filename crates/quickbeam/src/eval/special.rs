//! Special forms that declare, assign and short-circuit

use std::sync::Arc;

use super::{at_site, index_value, Expr, LambdaDef};
use crate::environment::Frame;
use crate::error::{EvalError, Flow, Reason};
use crate::frontend::{CallSite, Operation};
use crate::modules::use_module;
use crate::value::{HashableValue, Value};

/// Spread `values` over `count` targets, the one at `rest` taking a list.
fn distribute(
    fm: &Frame,
    count: usize,
    rest: Option<usize>,
    values: Vec<Value>,
) -> Result<Vec<Value>, EvalError> {
    let fixed = count - usize::from(rest.is_some());
    let ok = match rest {
        Some(_) => values.len() >= fixed,
        None => values.len() == fixed,
    };
    if !ok {
        return Err(fm.exception(Reason::ArityMismatch {
            what: "assignment right-hand-side".to_string(),
            valid: match rest {
                Some(_) => format!("{} or more", fixed),
                None => fixed.to_string(),
            },
            actual: values.len(),
        }));
    }
    let Some(at) = rest else {
        return Ok(values);
    };
    let extra = values.len() - fixed;
    let mut values = values.into_iter();
    let mut out: Vec<Value> = values.by_ref().take(at).collect();
    out.push(Value::list(values.by_ref().take(extra).collect()));
    out.extend(values);
    Ok(out)
}

fn eval_all(fm: &mut Frame, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
    let mut values = Vec::new();
    for expr in exprs {
        values.extend(expr.eval(fm)?);
    }
    Ok(values)
}

// ═══════════════════════════════════════════════════════════════════════
// var / set / del
// ═══════════════════════════════════════════════════════════════════════

/// `var a b @c = values...`; `None` targets are `_`.
pub(crate) struct VarOp {
    pub site: CallSite,
    pub targets: Vec<Option<String>>,
    pub rest: Option<usize>,
    pub values: Option<Vec<Expr>>,
}

impl Operation for VarOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let values = match &self.values {
                Some(exprs) => {
                    let values = eval_all(fm, exprs)?;
                    distribute(fm, self.targets.len(), self.rest, values)?
                }
                None => vec![Value::Nil; self.targets.len()],
            };
            for (target, value) in self.targets.iter().zip(values) {
                if let Some(name) = target {
                    fm.declare(name.clone(), value);
                }
            }
            Ok(())
        })
    }
}

/// An assignable place: a variable, optionally indexed.
pub(crate) struct LValue {
    pub name: String,
    pub indices: Vec<Expr>,
}

/// `set a b[k] @c = values...`.
pub(crate) struct SetOp {
    pub site: CallSite,
    pub targets: Vec<LValue>,
    pub rest: Option<usize>,
    pub values: Vec<Expr>,
}

impl Operation for SetOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let values = eval_all(fm, &self.values)?;
            let values = distribute(fm, self.targets.len(), self.rest, values)?;
            for (target, value) in self.targets.iter().zip(values) {
                let cell = fm
                    .lookup(&target.name)
                    .ok_or_else(|| fm.exception(Reason::NoSuchVariable(target.name.clone())))?;
                if target.indices.is_empty() {
                    cell.set(value);
                    continue;
                }
                let mut keys = Vec::with_capacity(target.indices.len());
                for index in &target.indices {
                    keys.push(index.eval_one(fm, "index")?);
                }
                let updated = assoc_path(fm, cell.get(), &keys, value)?;
                cell.set(updated);
            }
            Ok(())
        })
    }
}

/// `base` with the element at `keys` replaced by `value`.
fn assoc_path(fm: &Frame, base: Value, keys: &[Value], value: Value) -> Result<Value, EvalError> {
    let Some((key, rest)) = keys.split_first() else {
        return Ok(value);
    };
    let value = if rest.is_empty() {
        value
    } else {
        let inner = index_value(fm, &base, key)?;
        assoc_path(fm, inner, rest, value)?
    };
    assoc(fm, base, key, value)
}

fn assoc(fm: &Frame, base: Value, key: &Value, value: Value) -> Result<Value, EvalError> {
    match base {
        Value::List(items) => {
            let i = super::expr::list_index(key, items.len()).ok_or_else(|| {
                fm.exception(Reason::BadValue {
                    what: "index".to_string(),
                    valid: "valid list index".to_string(),
                    actual: key.repr(),
                })
            })?;
            let mut items = items.as_ref().clone();
            items[i] = value;
            Ok(Value::list(items))
        }
        Value::Map(map) => {
            let mut map = map.as_ref().clone();
            map.insert(HashableValue::from(key.clone()), value);
            Ok(Value::Map(Arc::new(map)))
        }
        Value::Ns(ns) => {
            let Some(name) = key.as_str() else {
                return Err(fm.exception(Reason::bad_value("namespace key", "string", key)));
            };
            match ns.cell(name) {
                Some(cell) => cell.set(value),
                None => {
                    ns.add(name, value);
                }
            }
            Ok(Value::Ns(ns))
        }
        other => Err(fm.exception(Reason::bad_value(
            "assignment target",
            "list, map or namespace",
            &other,
        ))),
    }
}

/// `del name` or `del name[k]`.
pub(crate) struct DelOp {
    pub site: CallSite,
    pub target: LValue,
}

impl Operation for DelOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let name = &self.target.name;
            if self.target.indices.is_empty() {
                if !fm.local.remove(name) {
                    return Err(fm.exception(Reason::NoSuchVariable(name.clone())));
                }
                return Ok(());
            }
            let cell = fm
                .lookup(name)
                .ok_or_else(|| fm.exception(Reason::NoSuchVariable(name.clone())))?;
            let mut keys = Vec::with_capacity(self.target.indices.len());
            for index in &self.target.indices {
                keys.push(index.eval_one(fm, "index")?);
            }
            let updated = dissoc_path(fm, cell.get(), &keys)?;
            cell.set(updated);
            Ok(())
        })
    }
}

fn dissoc_path(fm: &Frame, base: Value, keys: &[Value]) -> Result<Value, EvalError> {
    match keys {
        [] => Ok(base),
        [key] => match base {
            Value::Map(map) => {
                let mut map = map.as_ref().clone();
                if map.shift_remove(&HashableValue::from(key.clone())).is_none() {
                    return Err(fm.exception(Reason::NoSuchKey(key.repr())));
                }
                Ok(Value::Map(Arc::new(map)))
            }
            Value::Ns(ns) => {
                let removed = key.as_str().is_some_and(|name| ns.remove(name));
                if !removed {
                    return Err(fm.exception(Reason::NoSuchKey(key.repr())));
                }
                Ok(Value::Ns(ns))
            }
            other => Err(fm.exception(Reason::bad_value("deletion target", "map or namespace", &other))),
        },
        [key, rest @ ..] => {
            let inner = index_value(fm, &base, key)?;
            let inner = dissoc_path(fm, inner, rest)?;
            assoc(fm, base, key, inner)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// fn / use
// ═══════════════════════════════════════════════════════════════════════

/// `fn name { body }`.
///
/// The `name~` variable exists before the closure is built, so the body
/// can call itself.
pub(crate) struct FnOp {
    pub site: CallSite,
    pub var: String,
    pub lambda: Arc<LambdaDef>,
}

impl Operation for FnOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let cell = fm.declare(self.var.clone(), Value::Nil);
            let closure = self.lambda.instantiate(fm)?;
            cell.set(Value::from(closure));
            Ok(())
        })
    }
}

/// The body of a `fn`: stops `return`.
pub(crate) struct FnBody {
    pub body: Arc<dyn Operation>,
}

impl Operation for FnBody {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        match self.body.exec(fm) {
            Err(EvalError::Flow(Flow::Return)) => Ok(()),
            other => other,
        }
    }
}

/// `use spec` or `use spec alias`.
pub(crate) struct UseOp {
    pub site: CallSite,
    pub spec: String,
    pub var: String,
}

impl Operation for UseOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let ns = use_module(fm, &self.spec)?;
            fm.declare(self.var.clone(), Value::Ns(ns));
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// and / or
// ═══════════════════════════════════════════════════════════════════════

/// Which short-circuiting form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Logic {
    And,
    Or,
}

/// `and a b ...` outputs the first false value or the last value;
/// `or` the first true value or the last.
pub(crate) struct LogicOp {
    pub site: CallSite,
    pub kind: Logic,
    pub args: Vec<Expr>,
}

impl Operation for LogicOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let stop_on = self.kind == Logic::Or;
            let mut last = Value::Bool(!stop_on);
            for arg in &self.args {
                for value in arg.eval(fm)? {
                    if value.truthy() == stop_on {
                        return fm.put(value);
                    }
                    last = value;
                }
            }
            fm.put(last)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use crate::environment::Namespace;
    use crate::evaluator::Evaluator;
    use crate::frontend::Source;
    use crate::ports::Ports;

    fn frame() -> Frame {
        let ev = Evaluator::new(EvalContext::new());
        Frame::new(ev, Namespace::new(), Ports::discard(), Source::new("t", ""))
    }

    fn strs(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn test_distribute_exact() {
        let fm = frame();
        let out = distribute(&fm, 2, None, strs(&["a", "b"])).unwrap();
        assert_eq!(out, strs(&["a", "b"]));
        assert!(distribute(&fm, 2, None, strs(&["a"])).is_err());
    }

    #[test]
    fn test_distribute_rest() {
        let fm = frame();
        let out = distribute(&fm, 3, Some(1), strs(&["a", "b", "c", "d"])).unwrap();
        assert_eq!(
            out,
            vec![
                Value::from("a"),
                Value::list(strs(&["b", "c"])),
                Value::from("d")
            ]
        );
        let out = distribute(&fm, 1, Some(0), vec![]).unwrap();
        assert_eq!(out, vec![Value::list(vec![])]);
    }

    #[test]
    fn test_assoc_path_nested() {
        let fm = frame();
        let inner = Value::map([(Value::from("k"), Value::from("old"))]);
        let outer = Value::list(vec![inner]);
        let updated = assoc_path(
            &fm,
            outer,
            &[Value::from("0"), Value::from("k")],
            Value::from("new"),
        )
        .unwrap();
        let expected = Value::list(vec![Value::map([(Value::from("k"), Value::from("new"))])]);
        assert_eq!(updated, expected);
    }

    #[test]
    fn test_dissoc_missing_key() {
        let fm = frame();
        let map = Value::map([(Value::from("k"), Value::Nil)]);
        let err = dissoc_path(&fm, map, &[Value::from("x")]).unwrap_err();
        assert!(matches!(err.reason(), Some(Reason::NoSuchKey(k)) if k == "x"));
    }
}
