//! The top-level driver
//!
//! An [`Evaluator`] owns everything that outlives a single invocation: the
//! global and builtin namespaces, the module cache, the deprecation
//! registry, the configuration and the compiler. It is a cheap handle;
//! clones share all of it, and separate evaluators share nothing.

use dashmap::DashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

use crate::context::EvalContext;
use crate::environment::{builtin_namespace, Frame, Namespace};
use crate::error::{EvalError, Flow, Reason};
use crate::frontend::{CallSite, CompileScope, Compiler, Operation, Source};
use crate::frontends::ShellCompiler;
use crate::modules::ModuleCache;
use crate::ports::Ports;

struct EvaluatorInner {
    context: EvalContext,
    compiler: Arc<dyn Compiler>,
    global: Namespace,
    builtin: Namespace,
    modules: ModuleCache,
    deprecations: DashSet<CallSite>,
}

/// Compiles and runs code.
///
/// # Example
///
/// ```
/// use quickbeam::{EvalContext, Evaluator, Ports, Value};
///
/// let ev = Evaluator::new(EvalContext::new());
/// ev.eval_source("[example]", "var x = (put hello)", Ports::discard())
///     .unwrap();
/// assert_eq!(ev.global().get("x"), Some(Value::from("hello")));
/// ```
#[derive(Clone)]
pub struct Evaluator {
    inner: Arc<EvaluatorInner>,
}

impl Evaluator {
    /// Create an evaluator for the bundled shell language.
    pub fn new(context: EvalContext) -> Self {
        Self::with_compiler(context, Arc::new(ShellCompiler::new()))
    }

    /// Create an evaluator with a custom front end.
    pub fn with_compiler(context: EvalContext, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            inner: Arc::new(EvaluatorInner {
                context,
                compiler,
                global: Namespace::new(),
                builtin: builtin_namespace(),
                modules: ModuleCache::new(),
                deprecations: DashSet::new(),
            }),
        }
    }

    /// Configuration.
    pub fn context(&self) -> &EvalContext {
        &self.inner.context
    }

    /// The front end.
    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.inner.compiler
    }

    /// Namespace of top-level code.
    pub fn global(&self) -> &Namespace {
        &self.inner.global
    }

    /// Namespace of builtin functions and variables, searched last.
    pub fn builtin(&self) -> &Namespace {
        &self.inner.builtin
    }

    /// Loaded and registered modules.
    pub fn modules(&self) -> &ModuleCache {
        &self.inner.modules
    }

    /// Interrupt everything running on this evaluator.
    pub fn interrupt(&self) {
        tracing::debug!("interrupt requested");
        self.inner.context.interrupt();
    }

    /// Make a natively built namespace available to `use name`.
    pub fn register_module(&self, name: impl Into<String>, ns: Namespace) {
        self.inner.modules.register(name, ns);
    }

    /// Record a deprecation warning at `site`. Returns whether this is the
    /// first one there.
    pub(crate) fn first_warning(&self, site: &CallSite) -> bool {
        self.inner.deprecations.insert(site.clone())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Running code
    // ═══════════════════════════════════════════════════════════════════

    /// Compile `source` to run with `local` as its namespace.
    ///
    /// # Errors
    ///
    /// Parse and compile errors; nothing is executed.
    pub fn compile(
        &self,
        source: &Arc<Source>,
        local: &Namespace,
    ) -> Result<Arc<dyn Operation>, EvalError> {
        let scope = CompileScope {
            local,
            up: &[],
            builtin: self.builtin(),
        };
        self.inner.compiler.compile(source, scope)
    }

    /// Compile and run `source` at the top level.
    ///
    /// Declarations land in the global namespace.
    #[instrument(level = "info", skip(self, source, ports), fields(source = %source.name))]
    pub fn eval(&self, source: Arc<Source>, ports: Ports) -> Result<(), EvalError> {
        let op = self.compile(&source, self.global())?;
        let mut fm = Frame::new(self.clone(), self.global().clone(), ports, source);
        exec_chunk(op.as_ref(), &mut fm)
    }

    /// Compile and run a named piece of code at the top level.
    pub fn eval_source(
        &self,
        name: impl Into<String>,
        code: impl Into<String>,
        ports: Ports,
    ) -> Result<(), EvalError> {
        self.eval(Source::new(name, code), ports)
    }

    /// Read a file and run it at the top level.
    pub fn eval_file(&self, path: &Path, ports: Ports) -> Result<(), EvalError> {
        let code = std::fs::read_to_string(path)
            .map_err(|e| Reason::Io(format!("{}: {}", path.display(), e)))?;
        self.eval(Source::from_file(path.to_path_buf(), code), ports)
    }
}

/// Run a compiled chunk in its own frame.
///
/// A `return` ends the chunk normally; `break` or `continue` that reached
/// this far had no loop to act on.
pub(crate) fn exec_chunk(op: &dyn Operation, fm: &mut Frame) -> Result<(), EvalError> {
    match op.exec(fm) {
        Err(EvalError::Flow(Flow::Return)) => Ok(()),
        Err(EvalError::Flow(flow)) => Err(fm.exception(Reason::StrayFlow(flow))),
        other => other,
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("compiler", &self.inner.compiler.name())
            .field("global", &self.inner.global)
            .field("modules", &self.inner.modules.len())
            .finish()
    }
}
