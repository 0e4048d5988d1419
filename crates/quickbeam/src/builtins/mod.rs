//! Built-in commands
//!
//! Every builtin is a [`BuiltinFn`](crate::value::BuiltinFn) stored in the
//! builtin namespace under `name~`. Builtins run in the caller's frame, so
//! they see its ports, variables and current call site.

mod basic;
mod eval;
mod misc;
mod time;

pub use time::parse_sleep_duration;

use crate::environment::{Frame, Namespace};
use crate::error::{EvalError, Reason};
use crate::value::{Args, BuiltinFn, Signature, Value};

/// Add every builtin command to `ns`.
pub fn register(ns: &Namespace) {
    basic::register(ns);
    eval::register(ns);
    misc::register(ns);
    time::register(ns);
}

/// Store a builtin as `name~`.
fn define<F>(ns: &Namespace, name: &str, sig: Signature, func: F)
where
    F: Fn(&mut Frame, Args) -> Result<(), EvalError> + Send + Sync + 'static,
{
    ns.add_fn(name, BuiltinFn::new(name, sig, func));
}

/// The string in `value`, or a `BadValue` naming `what`.
fn string_arg<'v>(fm: &Frame, what: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| fm.exception(Reason::bad_value(what, "string", value)))
}

/// Items of the rest parameter at `index`.
fn rest_arg(args: &Args, index: usize) -> &[Value] {
    args.positional
        .get(index)
        .and_then(Value::as_list)
        .unwrap_or_default()
}
