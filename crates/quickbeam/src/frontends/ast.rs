//! Syntax tree for the shell language

use std::ops::Range;

use super::lexer::RedirMode;

/// Byte range in the source.
pub type Span = Range<usize>;

/// A sequence of pipelines, separated by newlines or `;`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Pipelines in order
    pub pipelines: Vec<Pipeline>,
}

/// Forms connected by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Stages in order
    pub forms: Vec<Form>,
    /// Source span
    pub span: Span,
}

/// One command: a head word followed by items.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    /// The command word
    pub head: Compound,
    /// Arguments, options and `=` in source order
    pub items: Vec<FormItem>,
    /// Redirections in source order
    pub redirs: Vec<Redir>,
    /// Source span
    pub span: Span,
}

/// Something after the head of a form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormItem {
    /// A positional argument
    Arg(Compound),
    /// `&name=value`, or `&name` alone
    Opt(OptionArg),
    /// A bare `=`, meaningful only to assignment forms
    Eq(Span),
}

/// `&name=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionArg {
    /// Option name
    pub name: String,
    /// Value; `None` for a bare `&name`
    pub value: Option<Compound>,
    /// Source span
    pub span: Span,
}

/// `N>path`, `N>>path`, `N>&M`.
#[derive(Debug, Clone, PartialEq)]
pub struct Redir {
    /// Port being redirected
    pub fd: usize,
    /// What happens to it
    pub mode: RedirMode,
    /// File name, for non-dup modes
    pub target: Option<Compound>,
    /// Source span
    pub span: Span,
}

/// Adjacent pieces forming one word, e.g. `a$x'b'`.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    /// The pieces
    pub parts: Vec<Indexed>,
    /// Source span
    pub span: Span,
}

impl Compound {
    /// The bareword this compound consists of, if that is all it is.
    pub fn as_bareword(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Indexed {
                head: Primary::Bareword(s),
                indices,
                ..
            }] if indices.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The string literal (bare or quoted) this compound consists of.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Indexed {
                head: Primary::Bareword(s) | Primary::Quoted(s),
                indices,
                ..
            }] if indices.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The lambda this compound consists of.
    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self.parts.as_slice() {
            [Indexed {
                head: Primary::Lambda(l),
                indices,
                ..
            }] if indices.is_empty() => Some(l),
            _ => None,
        }
    }
}

/// A primary with zero or more `[...]` indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Indexed {
    /// The indexee
    pub head: Primary,
    /// Each `[...]`, holding one or more index words
    pub indices: Vec<Vec<Compound>>,
    /// Source span
    pub span: Span,
}

/// The smallest word units.
#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
    /// `foo`
    Bareword(String),
    /// `'foo'` or `"foo"`
    Quoted(String),
    /// `$foo`, or `$@foo` when exploded
    Variable {
        /// Name without `$`
        name: String,
        /// Whether list items are spliced in
        explode: bool,
    },
    /// `(...)`
    Capture(Chunk),
    /// `[a b]`
    List(Vec<Compound>),
    /// `[&k=v]`
    Map(Vec<(Compound, Compound)>),
    /// `{ ... }`
    Lambda(Lambda),
}

/// `{|params &opts| body}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Positional parameters
    pub params: Vec<Param>,
    /// `&name=default` options
    pub options: Vec<(String, Compound)>,
    /// `&@name`
    pub rest_options: Option<String>,
    /// The body
    pub body: Chunk,
    /// Source span
    pub span: Span,
}

/// One positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name
    pub name: String,
    /// Whether this is `@name`
    pub rest: bool,
}
