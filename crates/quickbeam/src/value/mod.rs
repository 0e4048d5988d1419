//! Value representation for runtime values

mod callable;
mod display;
mod hashable;
mod impls;
mod num;

pub use callable::{Args, BuiltinFn, BuiltinFnPtr, Closure, OptionSpec, Signature};
pub use hashable::HashableValue;
pub use num::{parse_num, Num, Rational};

use indexmap::IndexMap;
use std::sync::Arc;

use crate::environment::Namespace;
use crate::error::Exception;

/// Ordered map storage used by [`Value::Map`].
pub type MapValue = IndexMap<HashableValue, Value>;

/// Runtime value representation.
///
/// Values are cheap to clone: everything larger than a word sits behind an
/// `Arc`. Namespaces are the exception to value semantics: a `Value::Ns`
/// is a shared handle, so two copies of it observe the same variables.
#[derive(Clone)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// The absence of a value
    Nil,

    /// Boolean: `$true` or `$false`
    Bool(bool),

    /// Text; barewords and quoted words both evaluate to strings
    String(Arc<String>),

    /// Any of the numeric representations
    Num(Num),

    // ═══════════════════════════════════════════════════════════════════
    // Containers
    // ═══════════════════════════════════════════════════════════════════
    /// Immutable list
    List(Arc<Vec<Value>>),

    /// Immutable ordered map
    Map(Arc<MapValue>),

    /// Shared, mutable namespace handle
    Ns(Namespace),

    // ═══════════════════════════════════════════════════════════════════
    // Callables
    // ═══════════════════════════════════════════════════════════════════
    /// User-defined function with captured scope
    Closure(Arc<Closure>),

    /// Built-in native function
    Builtin(BuiltinFn),

    /// Named external command
    External(Arc<String>),

    // ═══════════════════════════════════════════════════════════════════
    // Failures
    // ═══════════════════════════════════════════════════════════════════
    /// A caught exception (bound by `try ... catch e`)
    Exception(Exception),
}
