//! Front-end seam: source text, compiled operations, and compile errors
//!
//! The evaluator core never looks at syntax. A [`Compiler`] turns a
//! [`Source`] into an [`Operation`] tree, and the core only ever executes
//! operations against a [`Frame`]:
//!
//! ```text
//! Source → [Compiler] → Arc<dyn Operation> → exec(&mut Frame)
//! ```
//!
//! The default compiler for the bundled shell syntax lives in
//! [`crate::frontends`]; embedders can plug in their own.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::environment::{Frame, Namespace};
use crate::error::EvalError;

// ═══════════════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════════════

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of code handed to the evaluator.
#[derive(Debug)]
pub struct Source {
    /// Process-unique identity, distinguishes sources with equal text
    pub id: u64,

    /// Display name ("[eval]", "[tty]", a file path, ...)
    pub name: String,

    /// The code itself
    pub code: String,

    /// File the code was read from, if any. Relative `use` specs resolve
    /// against its directory.
    pub path: Option<PathBuf>,
}

impl Source {
    /// Create an in-memory source.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            code: code.into(),
            path: None,
        })
    }

    /// Create a source backed by a file.
    pub fn from_file(path: PathBuf, code: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            name: path.display().to_string(),
            code: code.into(),
            path: Some(path),
        })
    }

    /// Translate a byte offset into a line/column location.
    pub fn location(&self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.code.len());
        let before = self.code.get(..offset).unwrap_or(&self.code);
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        SourceLocation::new(self.name.clone(), line, column)
    }
}

/// Where in a source a form sits.
///
/// Two call sites are equal when they come from the same [`Source`] and
/// cover the same span, regardless of how many times that code ran.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// The source containing the form
    pub source: Arc<Source>,

    /// Byte range of the form
    pub span: Range<usize>,
}

impl CallSite {
    /// Create a call site.
    pub fn new(source: Arc<Source>, span: Range<usize>) -> Self {
        Self { source, span }
    }

    /// Line/column of the start of the form.
    pub fn location(&self) -> SourceLocation {
        self.source.location(self.span.start)
    }

    /// The text of the form.
    pub fn text(&self) -> &str {
        self.source.code.get(self.span.clone()).unwrap_or("")
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.source.id == other.source.id && self.span == other.span
    }
}

impl Eq for CallSite {}

impl Hash for CallSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.id.hash(state);
        self.span.start.hash(state);
        self.span.end.hash(state);
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = self.location();
        write!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.column, self.text())
    }
}

/// Source code location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// File name or identifier
    pub file: String,

    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════

/// Error that occurred during parsing.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message
    pub message: String,

    /// Optional source location
    pub location: Option<SourceLocation>,
}

impl ParseError {
    /// Create a new parse error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Add location information to the error.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}:{}:{}", loc.file, loc.line, loc.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error found while compiling a parsed tree, before anything runs.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Human-readable error message
    pub message: String,

    /// Optional source location
    pub location: Option<SourceLocation>,
}

impl CompileError {
    /// Create a new compile error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Add location information to the error.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compilation error: {}", self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}:{}:{}", loc.file, loc.line, loc.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

// ═══════════════════════════════════════════════════════════════════════
// COMPILER TRAIT
// ═══════════════════════════════════════════════════════════════════════

/// A compiled piece of code, ready to run against a frame.
pub trait Operation: Send + Sync {
    /// Run the operation, writing outputs to the frame's ports.
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError>;
}

/// Names visible to code being compiled.
///
/// The compiler uses this to reject references to undeclared variables
/// and to classify command heads.
#[derive(Debug, Clone, Copy)]
pub struct CompileScope<'a> {
    /// Namespace the code will run in; declarations land here
    pub local: &'a Namespace,

    /// Enclosing namespaces, innermost first
    pub up: &'a [Namespace],

    /// The builtin namespace
    pub builtin: &'a Namespace,
}

impl CompileScope<'_> {
    /// Whether `name` is visible in any tier.
    pub fn has(&self, name: &str) -> bool {
        self.local.contains(name)
            || self.up.iter().any(|ns| ns.contains(name))
            || self.builtin.contains(name)
    }
}

/// Language front end interface.
///
/// A compiler owns everything syntax-specific: parsing, static checks,
/// and the set of special forms.
pub trait Compiler: Send + Sync {
    /// Parse and compile a source into an operation tree.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Parse` or `EvalError::Compile`; no code runs.
    fn compile(
        &self,
        source: &Arc<Source>,
        scope: CompileScope<'_>,
    ) -> Result<Arc<dyn Operation>, EvalError>;

    /// Whether `name` is a special form in this language.
    fn is_special(&self, name: &str) -> bool;

    /// Return the name of this language front end.
    fn name(&self) -> &str;

    /// Return the file extension for module files of this language.
    fn file_extension(&self) -> &str;
}
