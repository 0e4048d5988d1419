//! Lexer for the shell language
//!
//! Whitespace is skipped, but the parser still needs to know what was
//! adjacent to what (`$x[0]` indexes, `$x [0]` passes a list), so every
//! token keeps its byte span and adjacency is read off the spans.
//!
//! # Token Categories
//!
//! - **Words**: barewords, single- and double-quoted strings, `$variables`
//! - **Punctuation**: `( ) [ ] { } | & =`
//! - **Separators**: newline and `;`
//! - **Redirections**: `>`, `>>`, `2>`, `2>&1`, `>&2`

use logos::{Logos, Span};
use std::fmt;

use crate::frontend::{ParseError, Source};

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The token
    pub token: T,
    /// Byte range in the source
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Pair a token with its span.
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    /// Nothing matches here
    #[default]
    UnexpectedCharacter,
    /// A backslash sequence the language does not define
    InvalidEscape(char),
    /// A redirection whose file descriptor is not a number
    InvalidFd,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::InvalidEscape(c) => write!(f, "invalid escape sequence \\{}", c),
            LexerError::InvalidFd => write!(f, "invalid file descriptor"),
        }
    }
}

/// How a redirection treats its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirMode {
    /// `>`: truncate or create the file
    Write,
    /// `>>`: append to the file
    Append,
    /// `>&M`: duplicate port M
    Dup(usize),
}

/// Tokens produced by the shell lexer.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"\^\r?\n")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Separators
    // ═══════════════════════════════════════════════════════════════════
    /// End of line
    #[token("\n")]
    Newline,

    /// `;`
    #[token(";")]
    Semicolon,

    /// `|`
    #[token("|")]
    Pipe,

    // ═══════════════════════════════════════════════════════════════════
    // Brackets
    // ═══════════════════════════════════════════════════════════════════
    /// `(`
    #[token("(")]
    LParen,

    /// `)`
    #[token(")")]
    RParen,

    /// `[`
    #[token("[")]
    LBracket,

    /// `]`
    #[token("]")]
    RBracket,

    /// `{`
    #[token("{")]
    LBrace,

    /// `}`
    #[token("}")]
    RBrace,

    // ═══════════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════════
    /// `&`, introducing options and map pairs
    #[token("&")]
    Amp,

    /// `=`
    #[token("=")]
    Eq,

    /// A redirection: file descriptor and mode
    #[regex(r"[0-9]*>>?", lex_redir)]
    #[regex(r"[0-9]*>&[0-9]+", lex_redir_dup)]
    Redir((Option<usize>, RedirMode)),

    // ═══════════════════════════════════════════════════════════════════
    // Words
    // ═══════════════════════════════════════════════════════════════════
    /// `$name`, `$ns:name`, `$f~`; `@` marks an exploded variable
    #[regex(r"\$@?[A-Za-z0-9_\-:~]*", lex_variable)]
    Variable((String, bool)),

    /// Quoted string, escapes already processed
    #[regex(r"'([^']|'')*'", lex_single_quoted)]
    #[regex(r#""([^"\\]|\\.)*""#, lex_double_quoted)]
    Quoted(String),

    /// Unquoted word
    #[regex(r"[A-Za-z0-9_\-./,:@~!%+*?^\x{80}-\x{10FFFF}]+", lex_bareword)]
    Bareword(String),
}

fn lex_redir(lex: &mut logos::Lexer<Token>) -> Result<(Option<usize>, RedirMode), LexerError> {
    let s = lex.slice();
    let (fd, mode) = match s.strip_suffix(">>") {
        Some(fd) => (fd, RedirMode::Append),
        None => (s.trim_end_matches('>'), RedirMode::Write),
    };
    Ok((parse_fd(fd)?, mode))
}

fn lex_redir_dup(
    lex: &mut logos::Lexer<Token>,
) -> Result<(Option<usize>, RedirMode), LexerError> {
    let (fd, target) = lex
        .slice()
        .split_once(">&")
        .ok_or(LexerError::InvalidFd)?;
    let target = target.parse().map_err(|_| LexerError::InvalidFd)?;
    Ok((parse_fd(fd)?, RedirMode::Dup(target)))
}

fn parse_fd(s: &str) -> Result<Option<usize>, LexerError> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse().map(Some).map_err(|_| LexerError::InvalidFd)
}

/// Lex a variable reference: `$@xs` → `("xs", true)`
fn lex_variable(lex: &mut logos::Lexer<Token>) -> (String, bool) {
    let name = &lex.slice()[1..];
    match name.strip_prefix('@') {
        Some(rest) => (rest.to_string(), true),
        None => (name.to_string(), false),
    }
}

/// Lex a single-quoted string: no escapes except `''` for a quote.
fn lex_single_quoted(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].replace("''", "'")
}

fn lex_double_quoted(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    let s = lex.slice();
    let mut out = String::with_capacity(s.len());
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('e') => out.push('\x1b'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '$')) => out.push(c),
            Some(other) => return Err(LexerError::InvalidEscape(other)),
            None => return Err(LexerError::InvalidEscape('\\')),
        }
    }
    Ok(out)
}

fn lex_bareword(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Newline => write!(f, "newline"),
            Token::Semicolon => write!(f, "';'"),
            Token::Pipe => write!(f, "'|'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Amp => write!(f, "'&'"),
            Token::Eq => write!(f, "'='"),
            Token::Redir(_) => write!(f, "redirection"),
            Token::Variable((name, _)) => write!(f, "${}", name),
            Token::Quoted(s) => write!(f, "{:?}", s),
            Token::Bareword(s) => write!(f, "{}", s),
        }
    }
}

/// Tokenize a whole source.
///
/// # Errors
///
/// A `ParseError` located at the first character no token matches.
pub fn tokenize(source: &Source) -> Result<Vec<Spanned<Token>>, ParseError> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(&source.code).spanned() {
        match result {
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => {
                return Err(ParseError::new(err.to_string()).with_location(source.location(span.start)))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(code: &str) -> Vec<Token> {
        tokenize(&Source::new("t", code))
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn bare(s: &str) -> Token {
        Token::Bareword(s.to_string())
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(lex("put a b"), vec![bare("put"), bare("a"), bare("b")]);
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            lex("var x = foo"),
            vec![bare("var"), bare("x"), Token::Eq, bare("foo")]
        );
        assert_eq!(lex("x=1"), vec![bare("x"), Token::Eq, bare("1")]);
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            lex("$x $mod:f~ $@rest"),
            vec![
                Token::Variable(("x".into(), false)),
                Token::Variable(("mod:f~".into(), false)),
                Token::Variable(("rest".into(), true)),
            ]
        );
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(lex("'it''s'"), vec![Token::Quoted("it's".into())]);
        assert_eq!(lex(r#""a\tb\"""#), vec![Token::Quoted("a\tb\"".into())]);
    }

    #[test]
    fn test_invalid_escape() {
        let err = tokenize(&Source::new("t", r#"put "\q""#)).unwrap_err();
        assert!(err.message.contains("\\q"));
        assert_eq!(err.location.unwrap().column, 5);
    }

    #[test]
    fn test_redirections() {
        assert_eq!(
            lex("f > out 2>> log 2>&1 >&2"),
            vec![
                bare("f"),
                Token::Redir((None, RedirMode::Write)),
                bare("out"),
                Token::Redir((Some(2), RedirMode::Append)),
                bare("log"),
                Token::Redir((Some(2), RedirMode::Dup(1))),
                Token::Redir((None, RedirMode::Dup(2))),
            ]
        );
    }

    #[test]
    fn test_comments_and_continuations() {
        assert_eq!(
            lex("put a # note\nput ^\nb"),
            vec![bare("put"), bare("a"), Token::Newline, bare("put"), bare("b")]
        );
    }

    #[test]
    fn test_durations_and_rationals_are_barewords() {
        assert_eq!(lex("1.3s 1/2 -7 3h5m7s 1µs"), vec![
            bare("1.3s"),
            bare("1/2"),
            bare("-7"),
            bare("3h5m7s"),
            bare("1µs"),
        ]);
    }

    #[test]
    fn test_spans_record_adjacency() {
        let tokens = tokenize(&Source::new("t", "$x[0] $y [0]")).unwrap();
        assert_eq!(tokens[0].span.end, tokens[1].span.start);
        assert_ne!(tokens[5].span.start, tokens[4].span.end);
    }
}
