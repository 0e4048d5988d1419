//! The builtin namespace

use super::Namespace;
use crate::builtins;
use crate::value::Value;

/// Create the namespace searched after every local and captured scope.
///
/// It holds the constants `$true`, `$false` and `$nil` and every builtin
/// command as `name~`.
pub fn builtin_namespace() -> Namespace {
    let ns = Namespace::new();
    ns.add("true", Value::Bool(true))
        .add("false", Value::Bool(false))
        .add("nil", Value::Nil);
    builtins::register(&ns);
    ns
}
