//! Ordinary command forms

use indexmap::IndexMap;
use std::fs::OpenOptions;
use std::sync::Arc;

use super::{at_site, Expr};
use crate::environment::Frame;
use crate::error::{EvalError, Reason};
use crate::frontend::{CallSite, Operation};
use crate::ports::{OutputPort, Ports};
use crate::value::Value;

/// How the command word was resolved at compile time.
pub(crate) enum Head {
    /// A function variable, looked up when the form runs (`name~`)
    Fn(String),
    /// Nothing by that name was in scope
    External(String),
    /// Any other word, evaluated to a callable
    Expr(Expr),
}

/// Where a redirected port goes.
pub(crate) enum RedirTarget {
    /// A file opened for writing or appending
    File { path: Expr, append: bool },
    /// Another port of the same form
    Dup(usize),
}

/// One redirection.
pub(crate) struct RedirOp {
    pub fd: usize,
    pub target: RedirTarget,
}

/// A command invocation.
pub(crate) struct FormOp {
    pub site: CallSite,
    pub head: Head,
    pub args: Vec<Expr>,
    pub opts: Vec<(String, Option<Expr>)>,
    pub redirs: Vec<RedirOp>,
}

impl FormOp {
    fn run(&self, fm: &mut Frame) -> Result<(), EvalError> {
        fm.check_interrupt()?;
        let head = match &self.head {
            Head::Fn(name) => fm
                .lookup_value(name)
                .ok_or_else(|| fm.exception(Reason::NoSuchVariable(name.clone())))?,
            Head::External(name) => Value::External(Arc::new(name.clone())),
            Head::Expr(expr) => expr.eval_one(fm, "command")?,
        };

        let mut args = Vec::new();
        for arg in &self.args {
            args.extend(arg.eval(fm)?);
        }
        let mut opts = IndexMap::new();
        for (name, value) in &self.opts {
            let value = match value {
                Some(expr) => expr.eval_one(fm, "option value")?,
                None => Value::Bool(true),
            };
            opts.insert(name.clone(), value);
        }

        if self.redirs.is_empty() {
            return head.call(fm, args, opts);
        }
        let ports = redirect(fm, &self.redirs)?;
        let mut redirected = fm.with_ports(ports);
        head.call(&mut redirected, args, opts)
    }
}

impl Operation for FormOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        if fm.evaluator().context().trace {
            tracing::trace!(site = %self.site, depth = fm.depth(), "form");
        }
        at_site(fm, &self.site, |fm| self.run(fm))
    }
}

/// Apply redirections, in order, to a copy of the frame's ports.
fn redirect(fm: &mut Frame, redirs: &[RedirOp]) -> Result<Ports, EvalError> {
    let mut ports = fm.ports.clone();
    for redir in redirs {
        let port = match &redir.target {
            RedirTarget::Dup(src) => ports.output_port(*src).cloned().ok_or_else(|| {
                fm.exception(Reason::BadValue {
                    what: "redirection source".to_string(),
                    valid: "1 or 2".to_string(),
                    actual: src.to_string(),
                })
            })?,
            RedirTarget::File { path, append } => {
                let path = path.eval_one(fm, "redirection target")?;
                let Some(name) = path.as_str() else {
                    return Err(fm.exception(Reason::bad_value(
                        "redirection target",
                        "string",
                        &path,
                    )));
                };
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(*append)
                    .truncate(!*append)
                    .open(name)
                    .map_err(|e| fm.exception(Reason::Io(format!("{}: {}", name, e))))?;
                OutputPort::file(file)
            }
        };
        ports
            .set_output_port(redir.fd, port)
            .map_err(|r| fm.exception(r))?;
    }
    Ok(ports)
}
