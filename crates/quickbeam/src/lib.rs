//! # Quickbeam
//!
//! The evaluator runtime of a small interactive shell language.
//!
//! Quickbeam compiles source text into a tree of operations and runs it
//! against a chain of namespaces. Commands form pipelines whose stages run
//! concurrently and pass values and bytes through ports; closures capture
//! the namespaces they were created in; failures travel as structured
//! exceptions that remember the call sites they passed through.
//!
//! ## Architecture
//!
//! - **Front end** ([`frontends`]): lexer, parser and a compiler that
//!   resolves variables and command heads statically
//! - **Environment** ([`environment`]): cells, namespaces and frames
//! - **Evaluator** ([`evaluator`]): owns the global and builtin namespaces,
//!   the module cache and the deprecation registry
//! - **Builtins** ([`builtins`]): `eval`, `call`, `resolve`, `use-mod`,
//!   `sleep`, `time`, `deprecate` and the basic commands around them
//!
//! ```
//! use quickbeam::{EvalContext, Evaluator, Ports};
//!
//! let ev = Evaluator::new(EvalContext::new());
//! ev.eval_source("[example]", "var x = foo; fn f { put $x }", Ports::discard())
//!     .unwrap();
//! assert!(ev.global().contains("f~"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod context;
pub mod environment;
pub mod error;
mod eval;
pub mod evaluator;
pub mod frontend;
pub mod frontends;
pub mod modules;
pub mod ports;
pub mod value;

// Re-export main types
pub use context::{EvalContext, Interrupt, Timer};
pub use environment::{builtin_namespace, Cell, Frame, Namespace};
pub use error::{EvalError, Exception, Flow, Reason, Result};
pub use evaluator::Evaluator;
pub use frontend::{
    CallSite, CompileError, CompileScope, Compiler, Operation, ParseError, Source,
    SourceLocation,
};
pub use ports::{ByteSink, Capture, InputPort, OutputPort, Ports, ValueSink};
pub use value::{Args, BuiltinFn, Closure, HashableValue, Num, Signature, Value};

/// Quickbeam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
