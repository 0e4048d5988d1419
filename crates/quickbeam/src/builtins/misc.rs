//! `resolve`, `use-mod` and `deprecate`

use super::{define, string_arg};
use crate::environment::Namespace;
use crate::error::Reason;
use crate::frontends::{command_name, CommandName};
use crate::modules::use_module;
use crate::value::{Signature, Value};

pub(super) fn register(ns: &Namespace) {
    define(ns, "resolve", Signature::new().param("command"), |fm, args| {
        let name = string_arg(fm, "command", &args.positional[0])?;
        if fm.evaluator().compiler().is_special(name) {
            return fm.put(Value::from("special"));
        }
        let resolved = match command_name(name, |var| fm.lookup(var).is_some()) {
            CommandName::External(program) => format!("(external {})", program),
            CommandName::Unbound(var) => return Err(fm.exception(Reason::NoSuchVariable(var))),
            CommandName::Fn(var) => match fm.lookup_value(&var) {
                Some(value) if value.is_callable() => format!("${}", var),
                Some(value) => {
                    return Err(fm.exception(Reason::bad_value("command", "callable", &value)))
                }
                None => return Err(fm.exception(Reason::NoSuchVariable(var))),
            },
        };
        fm.put(Value::from(resolved))
    });

    define(ns, "use-mod", Signature::new().param("spec"), |fm, args| {
        let spec = string_arg(fm, "module spec", &args.positional[0])?;
        let module = use_module(fm, spec)?;
        fm.put(Value::Ns(module))
    });

    define(ns, "deprecate", Signature::new().param("message"), |fm, args| {
        let message = args.positional[0].to_string();
        fm.deprecate(&message)
    });
}
