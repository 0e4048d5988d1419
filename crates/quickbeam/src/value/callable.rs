//! Callable value types: closures, builtins, and the signature descriptor

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use super::Value;
use crate::environment::{Frame, Namespace};
use crate::error::{EvalError, Reason};
use crate::frontend::{Operation, Source};

/// Type alias for builtin function pointers to reduce complexity
pub type BuiltinFnPtr = Arc<dyn Fn(&mut Frame, Args) -> Result<(), EvalError> + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════
// Signatures
// ═══════════════════════════════════════════════════════════════════════

/// A named option with its default value.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    /// Option name, without the leading `&`
    pub name: String,

    /// Value used when the caller does not pass the option
    pub default: Value,
}

/// Explicit description of what a callable accepts.
///
/// Both closures and builtins are bound through this descriptor, so a
/// mismatch always surfaces as a structured [`Reason`] instead of whatever
/// the callee happens to do with bad input.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    /// Positional parameter names, in order
    pub params: Vec<String>,

    /// Index into `params` of the rest parameter (`@name`), if any
    pub rest: Option<usize>,

    /// Named options with defaults
    pub options: Vec<OptionSpec>,

    /// Parameter receiving unrecognized options as a map (`&@name`)
    pub rest_options: Option<String>,
}

impl Signature {
    /// An empty signature: no arguments, no options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positional parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    /// Add the rest parameter at the current position.
    pub fn rest(mut self, name: impl Into<String>) -> Self {
        self.rest = Some(self.params.len());
        self.params.push(name.into());
        self
    }

    /// Add a named option.
    pub fn option(mut self, name: impl Into<String>, default: Value) -> Self {
        self.options.push(OptionSpec {
            name: name.into(),
            default,
        });
        self
    }

    /// Accept unknown options into a map parameter.
    pub fn rest_options(mut self, name: impl Into<String>) -> Self {
        self.rest_options = Some(name.into());
        self
    }

    /// Minimum and (if bounded) maximum positional argument count.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self.rest {
            Some(_) => (self.params.len() - 1, None),
            None => (self.params.len(), Some(self.params.len())),
        }
    }

    /// Bind call-site arguments against this signature.
    ///
    /// The returned [`Args`] has exactly one positional value per parameter
    /// (the rest parameter receives a list), and every declared option is
    /// present, filled from its default when not passed.
    ///
    /// # Errors
    ///
    /// - `ArityMismatch` if the positional count is out of range
    /// - `UnsupportedOption` for an unknown option without `rest_options`
    pub fn bind(
        &self,
        positional: Vec<Value>,
        options: IndexMap<String, Value>,
    ) -> Result<Args, Reason> {
        let (min, max) = self.arity();
        let actual = positional.len();
        if actual < min || max.is_some_and(|max| actual > max) {
            return Err(Reason::ArityMismatch {
                what: "arguments".to_string(),
                valid: match max {
                    Some(max) => max.to_string(),
                    None => format!("{} or more", min),
                },
                actual,
            });
        }

        let positional = match self.rest {
            Some(at) => {
                let mut items = positional.into_iter();
                let mut bound: Vec<Value> = items.by_ref().take(at).collect();
                let rest: Vec<Value> = items.by_ref().take(actual - min).collect();
                bound.push(Value::list(rest));
                bound.extend(items);
                bound
            }
            None => positional,
        };

        let mut bound = IndexMap::new();
        let mut extra = IndexMap::new();
        for (name, value) in options {
            if self.options.iter().any(|o| o.name == name) {
                bound.insert(name, value);
            } else if self.rest_options.is_some() {
                extra.insert(name, value);
            } else {
                return Err(Reason::UnsupportedOption(name));
            }
        }
        for spec in &self.options {
            bound
                .entry(spec.name.clone())
                .or_insert_with(|| spec.default.clone());
        }

        Ok(Args {
            positional,
            options: bound,
            extra_options: extra,
        })
    }
}

/// Arguments after binding against a [`Signature`].
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// One value per declared parameter
    pub positional: Vec<Value>,

    /// Every declared option, explicit or defaulted
    pub options: IndexMap<String, Value>,

    /// Unknown options, kept only when the signature accepts them
    pub extra_options: IndexMap<String, Value>,
}

impl Args {
    /// Get an option, treating `$nil` as "not given".
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name).filter(|v| !matches!(v, Value::Nil))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Closures
// ═══════════════════════════════════════════════════════════════════════

/// A closure: compiled code plus the namespace chain it captured.
///
/// The captured chain is fixed when the closure is created. The cells in
/// it are shared, so the closure sees later assignments to captured
/// variables, but names declared in the defining scope afterwards are not
/// part of the chain.
#[derive(Clone)]
pub struct Closure {
    /// Parameter descriptor
    pub sig: Signature,

    /// The compiled body
    pub body: Arc<dyn Operation>,

    /// Captured namespaces, innermost first
    pub captured: Arc<[Namespace]>,

    /// Source the body was compiled from
    pub source: Arc<Source>,
}

impl Closure {
    /// Create a new closure.
    pub fn new(
        sig: Signature,
        body: Arc<dyn Operation>,
        captured: Arc<[Namespace]>,
        source: Arc<Source>,
    ) -> Self {
        Self {
            sig,
            body,
            captured,
            source,
        }
    }

    /// Invoke the closure in a fresh frame.
    ///
    /// Parameters and options become variables of a new local namespace;
    /// the captured chain becomes the frame's outer scope. A `return`
    /// passes through: only bodies defined with `fn` stop it.
    pub fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: IndexMap<String, Value>,
    ) -> Result<(), EvalError> {
        let bound = self.sig.bind(args, opts).map_err(|r| fm.exception(r))?;

        let local = Namespace::new();
        for (name, value) in self.sig.params.iter().zip(bound.positional) {
            local.add(name, value);
        }
        for (name, value) in bound.options {
            local.add(name, value);
        }
        if let Some(name) = &self.sig.rest_options {
            let extra = bound
                .extra_options
                .into_iter()
                .map(|(k, v)| (Value::from(k), v));
            local.add(name, Value::map(extra));
        }

        let mut callee = fm.call_frame(local, self.captured.clone(), self.source.clone())?;
        self.body.exec(&mut callee)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({:?} @ {})", self.sig.params, self.source.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Builtins
// ═══════════════════════════════════════════════════════════════════════

/// A built-in native function.
///
/// These are Rust functions exposed to the interpreter.
#[derive(Clone)]
pub struct BuiltinFn {
    /// Function name (for display/debugging)
    pub name: String,

    /// What the builtin accepts
    pub sig: Signature,

    /// The actual function pointer
    pub func: BuiltinFnPtr,
}

impl BuiltinFn {
    /// Wrap a native function.
    pub fn new<F>(name: impl Into<String>, sig: Signature, func: F) -> Self
    where
        F: Fn(&mut Frame, Args) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            sig,
            func: Arc::new(func),
        }
    }

    /// Bind arguments and run the native function.
    pub fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: IndexMap<String, Value>,
    ) -> Result<(), EvalError> {
        let args = self.sig.bind(args, opts).map_err(|r| fm.exception(r))?;
        (self.func)(fm, args)
    }
}

impl fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinFn({})", self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Dispatch
// ═══════════════════════════════════════════════════════════════════════

impl Value {
    /// Call this value as a command.
    ///
    /// # Errors
    ///
    /// Returns a `BadValue` exception if the value is not callable, and
    /// whatever the callee raises otherwise.
    pub fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: IndexMap<String, Value>,
    ) -> Result<(), EvalError> {
        match self {
            Value::Closure(c) => c.call(fm, args, opts),
            Value::Builtin(b) => b.call(fm, args, opts),
            Value::External(name) => Err(fm.exception(Reason::ExternalCommand(name.to_string()))),
            other => Err(fm.exception(Reason::bad_value("command", "callable", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_bind_exact_arity() {
        let sig = Signature::new().param("a").param("b");
        let args = sig
            .bind(vec![Value::from("x"), Value::from("y")], IndexMap::new())
            .unwrap();
        assert_eq!(args.positional, vec![Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn test_bind_arity_mismatch() {
        let sig = Signature::new().param("a");
        let err = sig.bind(vec![], IndexMap::new()).unwrap_err();
        assert!(matches!(
            err,
            Reason::ArityMismatch { ref valid, actual: 0, .. } if valid == "1"
        ));
    }

    #[test]
    fn test_bind_rest_collects_middle() {
        let sig = Signature::new().param("first").rest("mid").param("last");
        let args = sig
            .bind(
                vec![
                    Value::from("a"),
                    Value::from("b"),
                    Value::from("c"),
                    Value::from("d"),
                ],
                IndexMap::new(),
            )
            .unwrap();
        assert_eq!(
            args.positional,
            vec![
                Value::from("a"),
                Value::list(vec![Value::from("b"), Value::from("c")]),
                Value::from("d"),
            ]
        );
    }

    #[test]
    fn test_bind_rest_may_be_empty() {
        let sig = Signature::new().rest("xs");
        let args = sig.bind(vec![], IndexMap::new()).unwrap();
        assert_eq!(args.positional, vec![Value::list(vec![])]);
    }

    #[test]
    fn test_bind_fills_option_defaults() {
        let sig = Signature::new().option("opt", Value::from("v"));
        let args = sig.bind(vec![], IndexMap::new()).unwrap();
        assert_eq!(args.options.get("opt"), Some(&Value::from("v")));

        let args = sig
            .bind(vec![], opts(&[("opt", Value::from("bar"))]))
            .unwrap();
        assert_eq!(args.options.get("opt"), Some(&Value::from("bar")));
    }

    #[test]
    fn test_bind_rejects_unknown_option() {
        let sig = Signature::new();
        let err = sig
            .bind(vec![], opts(&[("nope", Value::Nil)]))
            .unwrap_err();
        assert!(matches!(err, Reason::UnsupportedOption(ref name) if name == "nope"));
    }

    #[test]
    fn test_bind_rest_options_capture_unknown() {
        let sig = Signature::new().rest_options("opts");
        let args = sig
            .bind(vec![], opts(&[("x", Value::from("1"))]))
            .unwrap();
        assert_eq!(args.extra_options.get("x"), Some(&Value::from("1")));
    }

    #[test]
    fn test_args_option_treats_nil_as_absent() {
        let sig = Signature::new().option("on-end", Value::Nil);
        let args = sig.bind(vec![], IndexMap::new()).unwrap();
        assert!(args.option("on-end").is_none());
    }
}
