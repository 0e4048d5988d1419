//! Conditionals, loops and exception handling

use super::{all_truthy, at_site, call_body, Expr};
use crate::environment::Frame;
use crate::error::{combine_callback, EvalError, Flow, Reason};
use crate::frontend::{CallSite, Operation};
use crate::value::Value;

/// Evaluate a body word and call it.
fn run_body(fm: &mut Frame, body: &Expr) -> Result<(), EvalError> {
    let body = body.eval_one(fm, "body")?;
    call_body(fm, &body)
}

/// What a loop does after one iteration of its body.
enum Step {
    Next,
    Stop,
}

fn loop_step(result: Result<(), EvalError>) -> Result<Step, EvalError> {
    match result {
        Ok(()) | Err(EvalError::Flow(Flow::Continue)) => Ok(Step::Next),
        Err(EvalError::Flow(Flow::Break)) => Ok(Step::Stop),
        Err(e) => Err(e),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// if
// ═══════════════════════════════════════════════════════════════════════

/// `if c { } elif c { } else { }`.
pub(crate) struct IfOp {
    pub site: CallSite,
    pub branches: Vec<(Expr, Expr)>,
    pub else_body: Option<Expr>,
}

impl Operation for IfOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            for (cond, body) in &self.branches {
                if all_truthy(&cond.eval(fm)?) {
                    return run_body(fm, body);
                }
            }
            match &self.else_body {
                Some(body) => run_body(fm, body),
                None => Ok(()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// while / for
// ═══════════════════════════════════════════════════════════════════════

/// `while c { } else { }`; the else body runs when the loop body never did.
pub(crate) struct WhileOp {
    pub site: CallSite,
    pub cond: Expr,
    pub body: Expr,
    pub else_body: Option<Expr>,
}

impl Operation for WhileOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let body = self.body.eval_one(fm, "body")?;
            let mut ran = false;
            loop {
                fm.check_interrupt()?;
                if !all_truthy(&self.cond.eval(fm)?) {
                    break;
                }
                ran = true;
                if let Step::Stop = loop_step(call_body(fm, &body))? {
                    break;
                }
            }
            match &self.else_body {
                Some(body) if !ran => run_body(fm, body),
                _ => Ok(()),
            }
        })
    }
}

/// `for x $iterable { } else { }`.
///
/// The loop variable lives in the enclosing scope and keeps the last item
/// once the loop is over.
pub(crate) struct ForOp {
    pub site: CallSite,
    pub var: String,
    pub iterable: Expr,
    pub body: Expr,
    pub else_body: Option<Expr>,
}

impl Operation for ForOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let iterable = self.iterable.eval_one(fm, "iterable")?;
            let items: Vec<Value> = match &iterable {
                Value::List(items) => items.as_ref().clone(),
                Value::Map(map) => map.keys().map(|k| k.value().clone()).collect(),
                other => {
                    return Err(fm.exception(Reason::bad_value("iterable", "list or map", other)))
                }
            };
            let cell = fm.declare(self.var.clone(), Value::Nil);
            let body = self.body.eval_one(fm, "body")?;
            for item in &items {
                fm.check_interrupt()?;
                cell.set(item.clone());
                if let Step::Stop = loop_step(call_body(fm, &body))? {
                    break;
                }
            }
            match &self.else_body {
                Some(body) if items.is_empty() => run_body(fm, body),
                _ => Ok(()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// try
// ═══════════════════════════════════════════════════════════════════════

/// `try { } catch e { } else { } finally { }`.
///
/// Only exceptions are caught; `break`, `continue` and `return` pass
/// through, after running the finally body.
pub(crate) struct TryOp {
    pub site: CallSite,
    pub body: Expr,
    pub catch: Option<(Option<String>, Expr)>,
    pub else_body: Option<Expr>,
    pub finally: Option<Expr>,
}

impl TryOp {
    fn run(&self, fm: &mut Frame) -> Result<(), EvalError> {
        match run_body(fm, &self.body) {
            Err(EvalError::Exception(exc)) => match &self.catch {
                Some((var, catch)) => {
                    if let Some(var) = var {
                        fm.declare(var.clone(), Value::Exception(exc));
                    }
                    run_body(fm, catch)
                }
                None => Err(EvalError::Exception(exc)),
            },
            Ok(()) => match &self.else_body {
                Some(body) => run_body(fm, body),
                None => Ok(()),
            },
            Err(other) => Err(other),
        }
    }
}

impl Operation for TryOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| {
            let result = self.run(fm);
            match &self.finally {
                Some(finally) => combine_callback(result, run_body(fm, finally)),
                None => result,
            }
        })
    }
}
