//! The live execution context threaded through evaluation

use crossbeam::channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Cell, Namespace, NS_SUFFIX};
use crate::error::{EvalError, Exception, Reason};
use crate::evaluator::Evaluator;
use crate::frontend::{CallSite, Source};
use crate::ports::{Capture, OutputPort, Ports};
use crate::value::Value;

/// One invocation's view of the world.
///
/// A frame pairs a local [`Namespace`] with the chain of enclosing
/// namespaces it can see (innermost first), the I/O ports, and the call
/// site of the form currently running. Frames are created per closure
/// call, per `eval` and per module load, and are never shared between
/// concurrently running stages: a pipeline gives every stage its own
/// fork. The namespaces inside may be shared.
#[derive(Debug, Clone)]
pub struct Frame {
    ev: Evaluator,

    /// Namespace receiving declarations
    pub local: Namespace,

    /// Enclosing namespaces, innermost first
    pub up: Arc<[Namespace]>,

    /// Input, output and error ports
    pub ports: Ports,

    /// Source of the code running in this frame
    pub source: Arc<Source>,

    call_site: Option<CallSite>,
    depth: usize,
    loading: Arc<Vec<PathBuf>>,
}

impl Frame {
    /// A top-level frame with no enclosing scope.
    pub fn new(ev: Evaluator, local: Namespace, ports: Ports, source: Arc<Source>) -> Self {
        Self {
            ev,
            local,
            up: Arc::from(Vec::new()),
            ports,
            source,
            call_site: None,
            depth: 0,
            loading: Arc::new(Vec::new()),
        }
    }

    /// The evaluator this frame belongs to.
    pub fn evaluator(&self) -> &Evaluator {
        &self.ev
    }

    /// Number of calls between this frame and the top level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ═══════════════════════════════════════════════════════════════════
    // Call sites and failures
    // ═══════════════════════════════════════════════════════════════════

    /// The form currently running, if any.
    pub fn call_site(&self) -> Option<&CallSite> {
        self.call_site.as_ref()
    }

    /// Mark `site` as the running form, returning the previous one.
    pub fn set_call_site(&mut self, site: Option<CallSite>) -> Option<CallSite> {
        std::mem::replace(&mut self.call_site, site)
    }

    /// Raise `reason` at the running form.
    pub fn exception(&self, reason: Reason) -> EvalError {
        let exc = Exception::new(reason);
        match &self.call_site {
            Some(site) => exc.with_site(site.clone()).into(),
            None => exc.into(),
        }
    }

    /// Fail with `Interrupted` if the evaluator has been interrupted.
    pub fn check_interrupt(&self) -> Result<(), EvalError> {
        if self.ev.context().is_interrupted() {
            return Err(self.exception(Reason::Interrupted));
        }
        Ok(())
    }

    /// A receiver that disconnects when the evaluator is interrupted.
    pub fn interrupt_receiver(&self) -> Receiver<()> {
        self.ev.context().interrupt.receiver()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variables
    // ═══════════════════════════════════════════════════════════════════

    /// Find the cell for `name`: local first, then outward, then builtins.
    ///
    /// Qualified names (`mod:var`, `a:b:f~`) are resolved through the
    /// namespace bound to their first segment.
    pub fn lookup(&self, name: &str) -> Option<Cell> {
        match split_qualified(name) {
            Some((head, rest)) => {
                let ns = self.lookup_unqualified(head)?.get();
                resolve_in(ns.as_ns()?, rest)
            }
            None => self.lookup_unqualified(name),
        }
    }

    /// Current value of `name`, see [`Frame::lookup`].
    pub fn lookup_value(&self, name: &str) -> Option<Value> {
        self.lookup(name).map(|cell| cell.get())
    }

    fn lookup_unqualified(&self, name: &str) -> Option<Cell> {
        self.local
            .cell(name)
            .or_else(|| self.up.iter().find_map(|ns| ns.cell(name)))
            .or_else(|| self.ev.builtin().cell(name))
    }

    /// Declare `name` in the local namespace.
    pub fn declare(&self, name: impl Into<String>, value: Value) -> Cell {
        self.local.declare(name, value)
    }

    /// A namespace holding every cell visible from here except builtins.
    ///
    /// Inner bindings shadow outer ones. The map is new, so declarations
    /// made in it do not reach any namespace of this frame, but the cells
    /// are shared, so assignments do.
    pub fn derived_namespace(&self) -> Namespace {
        let ns = Namespace::new();
        for outer in self.up.iter().rev() {
            ns.absorb(outer);
        }
        ns.absorb(&self.local);
        ns
    }

    // ═══════════════════════════════════════════════════════════════════
    // Child frames
    // ═══════════════════════════════════════════════════════════════════

    /// A frame for calling a closure that captured `captured`.
    ///
    /// # Errors
    ///
    /// `StackOverflow` once the configured call depth is exceeded.
    pub fn call_frame(
        &self,
        local: Namespace,
        captured: Arc<[Namespace]>,
        source: Arc<Source>,
    ) -> Result<Frame, EvalError> {
        let max = self.ev.context().max_call_depth;
        if self.depth + 1 > max {
            return Err(self.exception(Reason::StackOverflow(max)));
        }
        Ok(Frame {
            ev: self.ev.clone(),
            local,
            up: captured,
            ports: self.ports.clone(),
            source,
            call_site: None,
            depth: self.depth + 1,
            loading: self.loading.clone(),
        })
    }

    /// A frame running `source` with `local` as its only namespace.
    pub fn eval_frame(&self, local: Namespace, source: Arc<Source>) -> Result<Frame, EvalError> {
        self.call_frame(local, Arc::from(Vec::new()), source)
    }

    /// A frame for loading the module at `path`.
    pub(crate) fn module_frame(
        &self,
        local: Namespace,
        source: Arc<Source>,
        path: PathBuf,
    ) -> Result<Frame, EvalError> {
        let mut fm = self.eval_frame(local, source)?;
        let mut loading = (*self.loading).clone();
        loading.push(path);
        fm.loading = Arc::new(loading);
        Ok(fm)
    }

    /// Whether the module at `path` is being loaded by this frame or an
    /// ancestor.
    pub(crate) fn is_loading(&self, path: &Path) -> bool {
        self.loading.iter().any(|p| p == path)
    }

    /// Modules this frame's chain of `use`s is loading, outermost first.
    pub(crate) fn loading_chain(&self) -> &[PathBuf] {
        &self.loading
    }

    /// Same scope, different ports.
    pub fn with_ports(&self, ports: Ports) -> Frame {
        Frame {
            ports,
            ..self.clone()
        }
    }

    /// Run `f` with output captured, returning what it produced.
    pub fn capture_output<F>(&self, f: F) -> Result<Vec<Value>, EvalError>
    where
        F: FnOnce(&mut Frame) -> Result<(), EvalError>,
    {
        let capture = Capture::new();
        let mut ports = self.ports.clone();
        ports.output = OutputPort::capture(&capture);
        let mut fm = self.with_ports(ports);
        f(&mut fm)?;
        Ok(capture.finish())
    }

    // ═══════════════════════════════════════════════════════════════════
    // I/O
    // ═══════════════════════════════════════════════════════════════════

    /// Write a value to the output port.
    pub fn put(&self, value: Value) -> Result<(), EvalError> {
        self.ports
            .output
            .values
            .put(value)
            .map_err(|r| self.exception(r))
    }

    /// Write bytes to the output port.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<(), EvalError> {
        self.ports
            .output
            .bytes
            .write(bytes)
            .map_err(|r| self.exception(r))
    }

    /// Write bytes to the error port.
    pub fn write_error_bytes(&self, bytes: &[u8]) -> Result<(), EvalError> {
        self.ports
            .error
            .bytes
            .write(bytes)
            .map_err(|r| self.exception(r))
    }

    /// Feed every input value (and byte line) to `f`.
    pub fn iterate_inputs<F>(&self, f: F) -> Result<(), EvalError>
    where
        F: FnMut(Value) -> Result<(), EvalError>,
    {
        let interrupt = self.interrupt_receiver();
        self.ports
            .input
            .iterate(&interrupt, f)
            .map_err(|e| self.annotate(e))
    }

    /// Attach the running form to an exception that has no stack yet.
    fn annotate(&self, err: EvalError) -> EvalError {
        match (&err, &self.call_site) {
            (EvalError::Exception(exc), Some(site)) if exc.stack().is_empty() => {
                err.through(site)
            }
            _ => err,
        }
    }

    /// Warn about a deprecated feature, once per call site.
    ///
    /// The key is the form running in this frame, so the same message
    /// from two places in the code warns twice, and a loop warns once.
    pub fn deprecate(&self, message: &str) -> Result<(), EvalError> {
        let text = match &self.call_site {
            Some(site) => {
                if !self.ev.first_warning(site) {
                    return Ok(());
                }
                format!("deprecation: {}\n  {}\n", message, site)
            }
            None => format!("deprecation: {}\n", message),
        };
        tracing::debug!(warning = message, "deprecation");
        self.write_error_bytes(text.as_bytes())
    }
}

/// Split `a:rest` into `("a:", "rest")`; `None` for unqualified names.
pub(crate) fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let colon = name.find(NS_SUFFIX)?;
    if colon + 1 == name.len() {
        return None;
    }
    Some(name.split_at(colon + 1))
}

/// Resolve a possibly-qualified name inside `ns` alone.
fn resolve_in(ns: &Namespace, name: &str) -> Option<Cell> {
    match split_qualified(name) {
        Some((head, rest)) => resolve_in(ns.get(head)?.as_ns()?, rest),
        None => ns.cell(name),
    }
}
