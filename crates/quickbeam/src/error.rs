//! Error types for evaluation
//!
//! Everything that can go wrong at run time is an [`Exception`] carrying a
//! [`Reason`] plus the call sites it unwound through. Parse and compile
//! failures happen before any code runs and are reported separately.
//! Non-local control flow (`return`, `break`, `continue`) travels on the
//! same channel as [`EvalError::Flow`] so every construct that catches
//! exceptions has to decide what to do with it explicitly.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::frontend::{CallSite, CompileError, ParseError};
use crate::value::Value;

/// Result type alias for evaluation
pub type Result<T> = std::result::Result<T, EvalError>;

// ═══════════════════════════════════════════════════════════════════════
// Evaluation errors
// ═══════════════════════════════════════════════════════════════════════

/// Main error type for evaluation.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// The code could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The code parsed but failed static checks
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A run-time failure
    #[error(transparent)]
    Exception(#[from] Exception),

    /// Non-local control flow in transit
    #[error("{0}")]
    Flow(Flow),
}

impl EvalError {
    /// The exception, if this is one.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            EvalError::Exception(exc) => Some(exc),
            _ => None,
        }
    }

    /// The exception reason, if this is an exception.
    pub fn reason(&self) -> Option<&Reason> {
        self.exception().map(Exception::reason)
    }

    /// Whether this is an exception raised by `fail` with this message.
    pub fn is_fail(&self, message: &str) -> bool {
        matches!(self.reason(), Some(Reason::Fail(v)) if v.to_string() == message)
    }

    /// Record that this error unwound through `site`.
    pub(crate) fn through(self, site: &CallSite) -> Self {
        match self {
            EvalError::Exception(exc) => EvalError::Exception(exc.with_site(site.clone())),
            other => other,
        }
    }
}

impl From<Reason> for EvalError {
    fn from(reason: Reason) -> Self {
        EvalError::Exception(Exception::new(reason))
    }
}

/// Non-local control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// `return`: leave the innermost closure
    Return,

    /// `break`: leave the innermost loop
    Break,

    /// `continue`: next iteration of the innermost loop
    Continue,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Return => write!(f, "return"),
            Flow::Break => write!(f, "break"),
            Flow::Continue => write!(f, "continue"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Exceptions
// ═══════════════════════════════════════════════════════════════════════

/// Why an exception was raised.
#[derive(Error, Debug, Clone)]
pub enum Reason {
    /// Raised by `fail`
    #[error("{0}")]
    Fail(Value),

    /// A value of the wrong shape
    #[error("bad value: {what} must be {valid}, but is {actual}")]
    BadValue {
        /// What was being checked
        what: String,
        /// What would have been accepted
        valid: String,
        /// What was found
        actual: String,
    },

    /// Wrong number of arguments
    #[error("arity mismatch: {what} must be {valid}, but is {actual}")]
    ArityMismatch {
        /// What was counted
        what: String,
        /// The accepted count or range
        valid: String,
        /// The count found
        actual: usize,
    },

    /// An option the callee does not declare
    #[error("unsupported option: {0}")]
    UnsupportedOption(String),

    /// A variable lookup that failed at run time
    #[error("variable ${0} not found")]
    NoSuchVariable(String),

    /// Indexing with a key that is absent
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// A `use` spec that resolved to nothing
    #[error("no such module: {0}")]
    NoSuchModule(String),

    /// A module that is (transitively) importing itself
    #[error("module {0} is already being loaded")]
    ModuleCycle(String),

    /// Argument to `sleep` that is not a duration
    #[error("invalid sleep duration")]
    InvalidSleepDuration,

    /// Argument to `sleep` that is below zero
    #[error("sleep duration must be >= zero")]
    NegativeSleepDuration,

    /// The reading end of an output channel went away
    #[error("reader gone")]
    ReaderGone,

    /// The evaluator was interrupted
    #[error("interrupted")]
    Interrupted,

    /// Too many nested calls
    #[error("max call depth exceeded ({0})")]
    StackOverflow(usize),

    /// Attempt to run an external program
    #[error("external command not available: {0}")]
    ExternalCommand(String),

    /// An I/O failure, e.g. while reading a module file
    #[error("{0}")]
    Io(String),

    /// A `return`, `break` or `continue` outside of its construct
    #[error("{0} outside of its construct")]
    StrayFlow(Flow),

    /// More than one stage of a pipeline failed
    #[error("{}", join_errors(.0))]
    Pipeline(Vec<EvalError>),

    /// Both a body and its completion callback failed
    #[error("{body}; on-end callback also failed: {callback}")]
    WithCallback {
        /// Failure of the body
        body: Box<EvalError>,
        /// Failure of the callback
        callback: Box<EvalError>,
    },
}

fn join_errors(errors: &[EvalError]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(" | "))
}

impl Reason {
    /// A `BadValue` reason describing `actual` by its kind.
    pub fn bad_value(what: impl Into<String>, valid: impl Into<String>, actual: &Value) -> Self {
        Reason::BadValue {
            what: what.into(),
            valid: valid.into(),
            actual: actual.kind().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct ExceptionInner {
    reason: Reason,
    stack: Vec<CallSite>,
}

/// A run-time failure.
///
/// Cheap to clone, so it can be stored in a variable by `try`/`catch` and
/// rethrown.
#[derive(Debug, Clone)]
pub struct Exception {
    inner: Arc<ExceptionInner>,
}

impl Exception {
    /// Create an exception with an empty stack.
    pub fn new(reason: Reason) -> Self {
        Self {
            inner: Arc::new(ExceptionInner {
                reason,
                stack: Vec::new(),
            }),
        }
    }

    /// Why the exception was raised.
    pub fn reason(&self) -> &Reason {
        &self.inner.reason
    }

    /// Call sites the exception unwound through, innermost first.
    pub fn stack(&self) -> &[CallSite] {
        &self.inner.stack
    }

    /// Append a call site unless it is the one on top already.
    pub fn with_site(mut self, site: CallSite) -> Self {
        if self.inner.stack.last() != Some(&site) {
            Arc::make_mut(&mut self.inner).stack.push(site);
        }
        self
    }

    /// Render the reason followed by one line per call site.
    pub fn traceback(&self) -> String {
        let mut out = format!("Exception: {}\n", self.reason());
        for site in self.stack() {
            out.push_str(&format!("  {}\n", site));
        }
        out
    }

    /// Whether two handles refer to the same raised exception.
    pub fn ptr_eq(&self, other: &Exception) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.reason)
    }
}

impl std::error::Error for Exception {}

// ═══════════════════════════════════════════════════════════════════════
// Combining failures
// ═══════════════════════════════════════════════════════════════════════

/// Merge the outcomes of a body and its completion callback.
///
/// A single failure is returned as is; when both fail, neither is lost.
/// A control flow signal from the body is not a failure, so a failing
/// callback replaces it.
pub fn combine_callback(body: Result<()>, callback: Result<()>) -> Result<()> {
    match (body, callback) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(EvalError::Flow(_)), Err(callback)) => Err(callback),
        (Err(body), Err(callback)) => Err(Reason::WithCallback {
            body: Box::new(body),
            callback: Box::new(callback),
        }
        .into()),
    }
}

/// Merge the outcomes of pipeline stages.
///
/// One failing stage yields its own error; several yield a composite.
pub fn combine_stages(results: Vec<Result<()>>) -> Result<()> {
    let mut errors: Vec<EvalError> = results.into_iter().filter_map(|r| r.err()).collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(Reason::Pipeline(errors).into()),
    }
}
