//! The shell language front end
//!
//! Source text goes through [`lexer`] and [`parser`] into an [`ast`], which
//! the compiler lowers into operations while checking variable references.

pub mod ast;
mod compiler;
pub mod lexer;
pub mod parser;

pub use compiler::SPECIAL_FORMS;
pub(crate) use compiler::{command_name, CommandName};

use std::sync::Arc;
use tracing::instrument;

use crate::error::EvalError;
use crate::frontend::{CompileScope, Compiler, Operation, Source};

/// Front end for the shell language.
///
/// # Example
///
/// ```
/// use quickbeam::frontends::ShellCompiler;
/// use quickbeam::Compiler;
///
/// let compiler = ShellCompiler::new();
/// assert!(compiler.is_special("var"));
/// assert!(!compiler.is_special("put"));
/// assert_eq!(compiler.file_extension(), "qb");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShellCompiler;

impl ShellCompiler {
    /// Create a new shell compiler.
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for ShellCompiler {
    #[instrument(level = "debug", skip(self, source, scope), fields(source = %source.name))]
    fn compile(
        &self,
        source: &Arc<Source>,
        scope: CompileScope<'_>,
    ) -> Result<Arc<dyn Operation>, EvalError> {
        let chunk = parser::parse(source)?;
        compiler::lower(source, &chunk, scope)
    }

    fn is_special(&self, name: &str) -> bool {
        SPECIAL_FORMS.contains(&name)
    }

    fn name(&self) -> &str {
        "quickbeam"
    }

    fn file_extension(&self) -> &str {
        "qb"
    }
}
