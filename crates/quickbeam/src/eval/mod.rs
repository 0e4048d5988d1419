//! Executable operations
//!
//! The shell compiler lowers syntax into these. Commands and special
//! forms implement [`Operation`](crate::frontend::Operation); words are
//! [`Expr`]s producing zero or more values.

mod control;
mod expr;
mod form;
mod pipeline;
mod special;

pub(crate) use control::{ForOp, IfOp, TryOp, WhileOp};
pub(crate) use expr::{index_value, Expr, LambdaDef};
pub(crate) use form::{FormOp, Head, RedirOp, RedirTarget};
pub(crate) use pipeline::{ChunkOp, PipelineOp};
pub(crate) use special::{DelOp, FnBody, FnOp, LValue, Logic, LogicOp, SetOp, UseOp, VarOp};

use indexmap::IndexMap;

use crate::environment::Frame;
use crate::error::EvalError;
use crate::frontend::CallSite;
use crate::value::Value;

/// Run `f` with `site` as the frame's current form.
///
/// Exceptions leaving `f` record `site` in their stack.
pub(crate) fn at_site<T, F>(fm: &mut Frame, site: &CallSite, f: F) -> Result<T, EvalError>
where
    F: FnOnce(&mut Frame) -> Result<T, EvalError>,
{
    let prev = fm.set_call_site(Some(site.clone()));
    let result = f(fm).map_err(|e| e.through(site));
    fm.set_call_site(prev);
    result
}

/// Call a body value (usually a lambda) with no arguments.
pub(crate) fn call_body(fm: &mut Frame, body: &Value) -> Result<(), EvalError> {
    body.call(fm, Vec::new(), IndexMap::new())
}

/// Whether every value is truthy. No values counts as true.
pub(crate) fn all_truthy(values: &[Value]) -> bool {
    values.iter().all(Value::truthy)
}
