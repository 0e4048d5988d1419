//! Value output, failure and flow commands

use crate::environment::Namespace;
use crate::error::{EvalError, Flow, Reason};
use crate::value::{BuiltinFn, Num, Signature, Value};

use super::{define, rest_arg, string_arg};

pub(super) fn register(ns: &Namespace) {
    // Output
    define(ns, "put", Signature::new().rest("values"), |fm, args| {
        for value in rest_arg(&args, 0) {
            fm.put(value.clone())?;
        }
        Ok(())
    });
    define(
        ns,
        "echo",
        Signature::new().rest("values").option("sep", Value::from(" ")),
        |fm, args| {
            let mut text = join(rest_arg(&args, 0), args.option("sep"));
            text.push('\n');
            fm.write_bytes(text.as_bytes())
        },
    );
    define(
        ns,
        "print",
        Signature::new().rest("values").option("sep", Value::from(" ")),
        |fm, args| {
            let text = join(rest_arg(&args, 0), args.option("sep"));
            fm.write_bytes(text.as_bytes())
        },
    );
    define(
        ns,
        "nop",
        Signature::new().rest("args").rest_options("opts"),
        |_, _| Ok(()),
    );
    define(ns, "all", Signature::new().rest("inputs"), |fm, args| {
        let inputs = rest_arg(&args, 0);
        if inputs.is_empty() {
            return fm.iterate_inputs(|value| fm.put(value));
        }
        for value in inputs {
            fm.put(value.clone())?;
        }
        Ok(())
    });
    define(ns, "kind-of", Signature::new().rest("values"), |fm, args| {
        for value in rest_arg(&args, 0) {
            fm.put(Value::from(value.kind()))?;
        }
        Ok(())
    });

    // Constructors
    define(ns, "constantly", Signature::new().rest("values"), |fm, args| {
        let values = rest_arg(&args, 0).to_vec();
        let f = BuiltinFn::new("constantly", Signature::new(), move |fm, _| {
            for value in &values {
                fm.put(value.clone())?;
            }
            Ok(())
        });
        fm.put(Value::from(f))
    });
    define(ns, "ns", Signature::new().param("map"), |fm, args| {
        let Value::Map(map) = &args.positional[0] else {
            return Err(fm.exception(Reason::bad_value("argument", "map", &args.positional[0])));
        };
        let ns = Namespace::new();
        for (key, value) in map.iter() {
            let name = string_arg(fm, "namespace key", key.value())?;
            ns.add(name, value.clone());
        }
        fm.put(Value::Ns(ns))
    });
    define(ns, "num", Signature::new().param("n"), |fm, args| {
        let value = &args.positional[0];
        let n = value
            .to_num()
            .ok_or_else(|| fm.exception(Reason::bad_value("argument", "number", value)))?;
        fm.put(Value::Num(n))
    });
    define(ns, "float64", Signature::new().param("n"), |fm, args| {
        let value = &args.positional[0];
        let n = value
            .to_num()
            .ok_or_else(|| fm.exception(Reason::bad_value("argument", "number", value)))?;
        fm.put(Value::Num(Num::Float(n.to_f64())))
    });
    define(ns, "external", Signature::new().param("name"), |fm, args| {
        let name = string_arg(fm, "external name", &args.positional[0])?;
        fm.put(Value::External(name.to_string().into()))
    });

    // Failure and flow
    define(ns, "fail", Signature::new().param("reason"), |fm, args| {
        Err(fm.exception(Reason::Fail(args.positional[0].clone())))
    });
    define(ns, "return", Signature::new(), |_, _| Err(EvalError::Flow(Flow::Return)));
    define(ns, "break", Signature::new(), |_, _| Err(EvalError::Flow(Flow::Break)));
    define(ns, "continue", Signature::new(), |_, _| Err(EvalError::Flow(Flow::Continue)));
}

fn join(values: &[Value], sep: Option<&Value>) -> String {
    let sep = sep.map(Value::to_string).unwrap_or_default();
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(&sep)
}
