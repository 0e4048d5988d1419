//! `eval` and `call`

use indexmap::IndexMap;

use super::{define, string_arg};
use crate::environment::{Frame, Namespace};
use crate::error::{combine_callback, EvalError, Reason};
use crate::evaluator::exec_chunk;
use crate::frontend::Source;
use crate::value::{Args, Signature, Value};

pub(super) fn register(ns: &Namespace) {
    define(
        ns,
        "eval",
        Signature::new()
            .param("code")
            .option("ns", Value::Nil)
            .option("on-end", Value::Nil),
        eval,
    );
    define(
        ns,
        "call",
        Signature::new().param("f").param("args").param("opts"),
        call,
    );
}

/// Run code in a namespace.
///
/// Without `&ns` the code runs in a new namespace holding every cell the
/// caller can see: assignments reach the caller, declarations do not.
/// With `&ns` that namespace is used as is and keeps the declarations.
fn eval(fm: &mut Frame, args: Args) -> Result<(), EvalError> {
    let code = string_arg(fm, "code", &args.positional[0])?;
    let ns = match args.option("ns") {
        Some(Value::Ns(ns)) => ns.clone(),
        Some(other) => return Err(fm.exception(Reason::bad_value("&ns", "namespace", other))),
        None => fm.derived_namespace(),
    };

    let source = Source::new("[eval]", code);
    let op = fm.evaluator().compile(&source, &ns)?;
    let mut child = fm.eval_frame(ns.clone(), source)?;
    let result = exec_chunk(op.as_ref(), &mut child);

    match args.option("on-end") {
        Some(on_end) => {
            let ended = on_end.call(fm, vec![Value::Ns(ns)], IndexMap::new());
            combine_callback(result, ended)
        }
        None => result,
    }
}

/// Call `f` with a list of arguments and a map of options.
fn call(fm: &mut Frame, args: Args) -> Result<(), EvalError> {
    let (f, positional, options) = (&args.positional[0], &args.positional[1], &args.positional[2]);
    let Value::List(positional) = positional else {
        return Err(fm.exception(Reason::bad_value("argument list", "list", positional)));
    };
    let Value::Map(options) = options else {
        return Err(fm.exception(Reason::bad_value("option map", "map", options)));
    };
    let mut opts = IndexMap::with_capacity(options.len());
    for (key, value) in options.iter() {
        let name = key
            .value()
            .as_str()
            .ok_or_else(|| fm.exception(Reason::bad_value("option key", "string", key.value())))?;
        opts.insert(name.to_string(), value.clone());
    }
    f.call(fm, positional.as_ref().clone(), opts)
}
